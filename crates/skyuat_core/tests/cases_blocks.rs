use skyuat_core::db::open_db_in_memory;
use skyuat_core::repo::block::{BlockRepository, NewBlock};
use skyuat_core::repo::environment::{EnvironmentRepository, NewEnvironment};
use skyuat_core::repo::fleet::{EmailRepository, NewEmail, NewOperator, OperatorRepository};
use skyuat_core::repo::lookup::{LookupInput, SectionRepository, SystemRepository};
use skyuat_core::repo::testcase::{CasePatch, CaseRepository, NewCase, NewStep, StepRepository};
use skyuat_core::RepoError;

struct Fixture {
    env_id: i64,
    system_id: i64,
    section_id: i64,
    operator_id: i64,
}

fn setup(conn: &rusqlite::Connection) -> Fixture {
    let env_id = EnvironmentRepository::new(conn)
        .create(
            &NewEnvironment {
                name: "uat".to_string(),
                description: None,
            },
            "tester",
        )
        .unwrap()
        .id;
    let system_id = SystemRepository::new(conn)
        .create(&LookupInput {
            name: "USSP".to_string(),
            description: None,
        })
        .unwrap()
        .id;
    let section_id = SectionRepository::new(conn)
        .create(&LookupInput {
            name: "Operational".to_string(),
            description: None,
        })
        .unwrap()
        .id;
    let email_id = EmailRepository::new(conn)
        .create(
            &NewEmail {
                address: "pilot@example.com".to_string(),
            },
            env_id,
            "tester",
        )
        .unwrap()
        .id;
    let operator_id = OperatorRepository::new(conn)
        .create(
            &NewOperator {
                name: "AeroOps".to_string(),
                email_id,
                easa_id: None,
            },
            env_id,
            "tester",
        )
        .unwrap()
        .id;
    Fixture {
        env_id,
        system_id,
        section_id,
        operator_id,
    }
}

fn base_case(fixture: &Fixture, code: &str) -> NewCase {
    NewCase {
        code: code.to_string(),
        title: "Flight plan acceptance".to_string(),
        description: None,
        systems: vec![fixture.system_id],
        sections: vec![fixture.section_id],
        operators: vec![fixture.operator_id],
        drones: vec![],
        uhub_users: vec![],
        uas_zones: vec![],
    }
}

#[test]
fn case_update_replaces_present_sets_and_preserves_omitted_ones() {
    let conn = open_db_in_memory().unwrap();
    let fixture = setup(&conn);
    let repo = CaseRepository::new(&conn);

    let created = repo
        .create(&base_case(&fixture, "CASE001"), fixture.env_id, "alice")
        .unwrap();
    assert_eq!(created.operators.len(), 1);
    assert_eq!(created.systems.len(), 1);

    // Empty list clears; omitted key preserves.
    let updated = repo
        .update(
            created.case.id,
            &CasePatch {
                operators: Some(vec![]),
                ..CasePatch::default()
            },
            "alice",
        )
        .unwrap();
    assert!(updated.operators.is_empty());
    assert_eq!(updated.systems.len(), 1);
    assert_eq!(updated.sections.len(), 1);
}

#[test]
fn steps_auto_position_and_cascade_with_their_case() {
    let conn = open_db_in_memory().unwrap();
    let fixture = setup(&conn);
    let cases = CaseRepository::new(&conn);
    let steps = StepRepository::new(&conn);

    let case = cases
        .create(&base_case(&fixture, "CASE001"), fixture.env_id, "alice")
        .unwrap();

    let first = steps
        .create(
            case.case.id,
            &NewStep {
                position: None,
                action: "Submit the operation plan".to_string(),
                expected_result: Some("Plan accepted".to_string()),
                requirements: vec![],
            },
            "alice",
        )
        .unwrap();
    let second = steps
        .create(
            case.case.id,
            &NewStep {
                position: None,
                action: "Activate the flight".to_string(),
                expected_result: None,
                requirements: vec![],
            },
            "alice",
        )
        .unwrap();
    assert_eq!(first.step.position, 1);
    assert_eq!(second.step.position, 2);

    // Deleting the case removes its steps.
    assert!(cases.delete(case.case.id).unwrap());
    assert!(steps.get_by_id(first.step.id).unwrap().is_none());
    assert!(steps.get_by_id(second.step.id).unwrap().is_none());
}

#[test]
fn reorder_rewrites_positions_and_validates_the_id_set() {
    let conn = open_db_in_memory().unwrap();
    let fixture = setup(&conn);
    let cases = CaseRepository::new(&conn);
    let steps = StepRepository::new(&conn);

    let case = cases
        .create(&base_case(&fixture, "CASE001"), fixture.env_id, "alice")
        .unwrap();
    let mut ids = Vec::new();
    for action in ["first", "second", "third"] {
        let step = steps
            .create(
                case.case.id,
                &NewStep {
                    position: None,
                    action: action.to_string(),
                    expected_result: None,
                    requirements: vec![],
                },
                "alice",
            )
            .unwrap();
        ids.push(step.step.id);
    }

    ids.reverse();
    let reordered = steps.reorder(case.case.id, &ids, "alice").unwrap();
    assert_eq!(reordered[0].action, "third");
    assert_eq!(reordered[0].position, 1);
    assert_eq!(reordered[2].action, "first");

    let incomplete = steps
        .reorder(case.case.id, &ids[..2], "alice")
        .unwrap_err();
    assert!(matches!(incomplete, RepoError::Validation(_)));
}

#[test]
fn case_in_a_block_is_delete_restricted() {
    let conn = open_db_in_memory().unwrap();
    let fixture = setup(&conn);
    let cases = CaseRepository::new(&conn);
    let blocks = BlockRepository::new(&conn);

    let case = cases
        .create(&base_case(&fixture, "CASE001"), fixture.env_id, "alice")
        .unwrap();
    let block = blocks
        .create(
            &NewBlock {
                name: "Nominal flows".to_string(),
                system_id: fixture.system_id,
                cases: vec![case.case.id],
            },
            fixture.env_id,
            "alice",
        )
        .unwrap();
    assert_eq!(block.cases.len(), 1);

    assert!(cases.delete(case.case.id).unwrap_err().is_foreign_key_conflict());

    // Detach the case from the block, then the delete goes through.
    blocks
        .update(
            block.block.id,
            &skyuat_core::repo::block::BlockPatch {
                cases: Some(vec![]),
                ..Default::default()
            },
            "alice",
        )
        .unwrap();
    assert!(cases.delete(case.case.id).unwrap());
}

#[test]
fn step_requirement_links_replace_wholesale() {
    let conn = open_db_in_memory().unwrap();
    let fixture = setup(&conn);
    let cases = CaseRepository::new(&conn);
    let steps = StepRepository::new(&conn);
    let requirements = skyuat_core::repo::requirement::RequirementRepository::new(&conn);

    let req_a = requirements
        .create(
            &skyuat_core::repo::requirement::NewRequirement {
                code: "REQ001".to_string(),
                definition: "Plan acceptance requirement.".to_string(),
                systems: vec![fixture.system_id],
                sections: vec![fixture.section_id],
            },
            fixture.env_id,
            "alice",
        )
        .unwrap();
    let req_b = requirements
        .create(
            &skyuat_core::repo::requirement::NewRequirement {
                code: "REQ002".to_string(),
                definition: "Flight activation requirement.".to_string(),
                systems: vec![fixture.system_id],
                sections: vec![fixture.section_id],
            },
            fixture.env_id,
            "alice",
        )
        .unwrap();

    let case = cases
        .create(&base_case(&fixture, "CASE001"), fixture.env_id, "alice")
        .unwrap();
    let step = steps
        .create(
            case.case.id,
            &NewStep {
                position: None,
                action: "Submit plan".to_string(),
                expected_result: None,
                requirements: vec![req_a.requirement.id],
            },
            "alice",
        )
        .unwrap();
    assert_eq!(step.requirements.len(), 1);

    let updated = steps
        .update(
            step.step.id,
            &skyuat_core::repo::testcase::StepPatch {
                requirements: Some(vec![req_b.requirement.id]),
                ..Default::default()
            },
            "alice",
        )
        .unwrap();
    assert_eq!(updated.requirements.len(), 1);
    assert_eq!(updated.requirements[0].code, "REQ002");

    // The requirement side sees the link through hydration.
    let detail = requirements
        .get_with_relations(req_b.requirement.id)
        .unwrap()
        .unwrap();
    assert_eq!(detail.step_ids, vec![step.step.id]);
}
