use skyuat_core::model::bug::BugStatus;
use skyuat_core::model::campaign::{CampaignStatus, StepOutcome};
use skyuat_core::model::file::FileOwner;
use skyuat_core::repo::block::NewBlock;
use skyuat_core::{
    AppContext, BugDraft, BugService, CampaignDraft, CampaignService, CampaignServiceError,
    CaseDraft, CaseService, ContextConfig, FileDraft, RequirementService, StepDraft, BUG_SERVICE,
    CAMPAIGN_SERVICE, CASE_SERVICE, REQUIREMENT_SERVICE,
};

struct Fixture {
    env_id: i64,
    system_id: i64,
    section_id: i64,
}

fn initialized_context() -> (AppContext, Fixture) {
    let mut context = AppContext::new(ContextConfig::test_mode());
    context.initialize().unwrap();

    let env_id = context
        .with_unit_of_work(|uow| {
            let (env, _) = uow.environments().get_or_create("uat", "tester")?;
            uow.commit()?;
            Ok(env.id)
        })
        .unwrap();

    let requirements: &RequirementService = context.service(REQUIREMENT_SERVICE).unwrap();
    let (system, _) = requirements.ensure_system("USSP").unwrap();
    let (section, _) = requirements.ensure_section("Operational").unwrap();

    let fixture = Fixture {
        env_id,
        system_id: system.id,
        section_id: section.id,
    };
    (context, fixture)
}

fn case_draft(fixture: &Fixture, code: &str) -> CaseDraft {
    CaseDraft {
        code: code.to_string(),
        title: format!("Case {code}"),
        description: None,
        systems: vec![fixture.system_id],
        sections: vec![fixture.section_id],
        operators: vec![],
        drones: vec![],
        uhub_users: vec![],
        uas_zones: vec![],
        steps: vec![
            StepDraft {
                action: "Submit the operation plan".to_string(),
                expected_result: Some("Plan accepted".to_string()),
                requirements: vec![],
            },
            StepDraft {
                action: "Activate the flight".to_string(),
                expected_result: None,
                requirements: vec![],
            },
        ],
    }
}

fn build_campaign(context: &AppContext, fixture: &Fixture) -> i64 {
    let cases: &CaseService = context.service(CASE_SERVICE).unwrap();
    let case_a = cases
        .create_case(&case_draft(fixture, "CASE001"), fixture.env_id, "alice")
        .unwrap();
    let case_b = cases
        .create_case(&case_draft(fixture, "CASE002"), fixture.env_id, "alice")
        .unwrap();

    // Two blocks sharing CASE001 so run snapshots must deduplicate.
    let (block_a, block_b) = context
        .with_unit_of_work(|uow| {
            let blocks = uow.blocks();
            let block_a = blocks.create(
                &NewBlock {
                    name: "Nominal".to_string(),
                    system_id: fixture.system_id,
                    cases: vec![case_a.case.id, case_b.case.id],
                },
                fixture.env_id,
                "alice",
            )?;
            let block_b = blocks.create(
                &NewBlock {
                    name: "Regression".to_string(),
                    system_id: fixture.system_id,
                    cases: vec![case_a.case.id],
                },
                fixture.env_id,
                "alice",
            )?;
            uow.commit()?;
            Ok((block_a.block.id, block_b.block.id))
        })
        .unwrap();

    let campaigns: &CampaignService = context.service(CAMPAIGN_SERVICE).unwrap();
    campaigns
        .create_campaign(
            &CampaignDraft {
                code: "CAMP001".to_string(),
                name: "Release 1 acceptance".to_string(),
                system_id: fixture.system_id,
                blocks: vec![block_a, block_b],
            },
            fixture.env_id,
            "alice",
        )
        .unwrap()
        .campaign
        .id
}

#[test]
fn campaign_starts_as_draft_and_follows_the_status_machine() {
    let (context, fixture) = initialized_context();
    let campaign_id = build_campaign(&context, &fixture);
    let campaigns: &CampaignService = context.service(CAMPAIGN_SERVICE).unwrap();

    let detail = campaigns.get_campaign(campaign_id).unwrap().unwrap();
    assert_eq!(detail.campaign.status, CampaignStatus::Draft);

    let running = campaigns
        .transition(campaign_id, CampaignStatus::Running, "alice")
        .unwrap();
    assert_eq!(running.campaign.status, CampaignStatus::Running);

    let finished = campaigns
        .transition(campaign_id, CampaignStatus::Finished, "alice")
        .unwrap();
    assert_eq!(finished.campaign.status, CampaignStatus::Finished);

    let err = campaigns
        .transition(campaign_id, CampaignStatus::Running, "alice")
        .unwrap_err();
    assert!(matches!(
        err,
        CampaignServiceError::InvalidTransition {
            from: CampaignStatus::Finished,
            to: CampaignStatus::Running
        }
    ));
}

#[test]
fn start_run_requires_a_running_campaign() {
    let (context, fixture) = initialized_context();
    let campaign_id = build_campaign(&context, &fixture);
    let campaigns: &CampaignService = context.service(CAMPAIGN_SERVICE).unwrap();

    let err = campaigns.start_run(campaign_id, "alice").unwrap_err();
    assert!(matches!(err, CampaignServiceError::NotRunning(id) if id == campaign_id));
}

#[test]
fn start_run_snapshots_distinct_cases_with_pending_steps() {
    let (context, fixture) = initialized_context();
    let campaign_id = build_campaign(&context, &fixture);
    let campaigns: &CampaignService = context.service(CAMPAIGN_SERVICE).unwrap();

    campaigns
        .transition(campaign_id, CampaignStatus::Running, "alice")
        .unwrap();
    let run = campaigns.start_run(campaign_id, "alice").unwrap();

    // CASE001 appears in both blocks but is snapshotted once.
    assert_eq!(run.case_runs.len(), 2);
    for case_run in &run.case_runs {
        assert_eq!(case_run.step_runs.len(), 2);
        assert!(case_run
            .step_runs
            .iter()
            .all(|step_run| step_run.outcome == StepOutcome::Pending));
    }
    assert!(run.run.finished_at.is_none());
}

#[test]
fn step_results_and_finish_complete_the_run() {
    let (context, fixture) = initialized_context();
    let campaign_id = build_campaign(&context, &fixture);
    let campaigns: &CampaignService = context.service(CAMPAIGN_SERVICE).unwrap();

    campaigns
        .transition(campaign_id, CampaignStatus::Running, "alice")
        .unwrap();
    let run = campaigns.start_run(campaign_id, "alice").unwrap();
    let first_step_run = run.case_runs[0].step_runs[0].id;
    let second_step_run = run.case_runs[0].step_runs[1].id;

    campaigns
        .record_step_result(first_step_run, StepOutcome::Passed, None, None, "alice")
        .unwrap();
    campaigns
        .record_step_result(
            second_step_run,
            StepOutcome::Failed,
            Some("activation rejected"),
            Some(&FileDraft {
                owner_kind: FileOwner::StepRun,
                filename: "activation-log.txt".to_string(),
                mime_type: Some("text/plain".to_string()),
                size_bytes: 2048,
            }),
            "alice",
        )
        .unwrap();

    let finished = campaigns.finish_run(run.run.id, "alice").unwrap();
    assert!(finished.run.finished_at.is_some());

    let failed_step = finished.case_runs[0]
        .step_runs
        .iter()
        .find(|step_run| step_run.id == second_step_run)
        .unwrap();
    assert_eq!(failed_step.outcome, StepOutcome::Failed);
    assert_eq!(failed_step.note.as_deref(), Some("activation rejected"));
    assert!(failed_step.file_id.is_some());

    // The registered evidence file is findable by its original name.
    let stored = context
        .with_unit_of_work(|uow| uow.files().get_by_filename(fixture.env_id, "activation-log.txt"))
        .unwrap()
        .unwrap();
    assert_eq!(stored.owner_kind, FileOwner::StepRun);
    assert_ne!(stored.stored_name, stored.filename);
}

#[test]
fn bug_lifecycle_appends_history_and_never_shrinks_it() {
    let (context, fixture) = initialized_context();
    let campaign_id = build_campaign(&context, &fixture);
    let campaigns: &CampaignService = context.service(CAMPAIGN_SERVICE).unwrap();
    let bugs: &BugService = context.service(BUG_SERVICE).unwrap();

    campaigns
        .transition(campaign_id, CampaignStatus::Running, "alice")
        .unwrap();
    let run = campaigns.start_run(campaign_id, "alice").unwrap();

    let reported = bugs
        .report_bug(
            &BugDraft {
                title: "Flight activation rejected".to_string(),
                description: Some("Activation fails for accepted plans.".to_string()),
                system_id: fixture.system_id,
                campaign_run_id: Some(run.run.id),
                requirements: vec![],
            },
            fixture.env_id,
            "alice",
        )
        .unwrap();
    assert_eq!(reported.bug.status, BugStatus::Open);
    assert_eq!(reported.history.len(), 1);
    assert_eq!(reported.history[0].summary, "bug reported");

    let in_progress = bugs
        .change_status(reported.bug.id, BugStatus::InProgress, "bob")
        .unwrap();
    assert_eq!(in_progress.history.len(), 2);

    let with_file = bugs
        .attach_file(
            reported.bug.id,
            &FileDraft {
                owner_kind: FileOwner::Bug,
                filename: "screenshot.png".to_string(),
                mime_type: Some("image/png".to_string()),
                size_bytes: 4096,
            },
            "bob",
        )
        .unwrap();
    assert!(with_file.bug.file_id.is_some());
    assert_eq!(with_file.history.len(), 3);

    // History is ordered oldest-first and retains every entry.
    let actors: Vec<&str> = with_file
        .history
        .iter()
        .map(|entry| entry.actor.as_str())
        .collect();
    assert_eq!(actors, vec!["alice", "bob", "bob"]);

    // The campaign run is delete-restricted while the bug references it.
    let blocked = context
        .with_unit_of_work(|uow| uow.campaign_runs().delete(run.run.id))
        .unwrap_err();
    assert!(matches!(
        blocked,
        skyuat_core::ContextError::Repo(ref err) if err.is_foreign_key_conflict()
    ));
}
