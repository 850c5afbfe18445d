use skyuat_core::db::{init_db, open_db_in_memory};
use skyuat_core::model::zone::AreaType;
use skyuat_core::repo::environment::{EnvironmentRepository, NewEnvironment};
use skyuat_core::repo::lookup::ReasonRepository;
use skyuat_core::repo::uhub::UhubOrgRepository;
use skyuat_core::repo::zone::{NewUasZone, UasZonePatch, UasZoneRepository};
use skyuat_core::RepoError;

fn setup() -> (rusqlite::Connection, i64) {
    let mut conn = open_db_in_memory().unwrap();
    init_db(&mut conn, false, true).unwrap();
    let env_id = EnvironmentRepository::new(&conn)
        .create(
            &NewEnvironment {
                name: "uat".to_string(),
                description: None,
            },
            "tester",
        )
        .unwrap()
        .id;
    (conn, env_id)
}

fn circle_zone(name: &str) -> NewUasZone {
    NewUasZone {
        name: name.to_string(),
        area_type: AreaType::Circle,
        radius_m: Some(500.0),
        width_m: None,
        lower_limit_m: Some(0),
        upper_limit_m: Some(120),
        organizations: vec![],
        reasons: vec![],
    }
}

#[test]
fn circle_zone_requires_radius_and_corridor_requires_width() {
    let (conn, env_id) = setup();
    let repo = UasZoneRepository::new(&conn);

    let mut missing_radius = circle_zone("LEZL CTR");
    missing_radius.radius_m = None;
    let err = repo.create(&missing_radius, env_id, "alice").unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));
    assert!(err.to_string().contains("radius_m"));

    let missing_width = NewUasZone {
        name: "River corridor".to_string(),
        area_type: AreaType::Corridor,
        radius_m: None,
        width_m: None,
        lower_limit_m: None,
        upper_limit_m: None,
        organizations: vec![],
        reasons: vec![],
    };
    let err = repo.create(&missing_width, env_id, "alice").unwrap_err();
    assert!(err.to_string().contains("width_m"));

    // Polygon needs neither scalar.
    let polygon = NewUasZone {
        name: "Harbor polygon".to_string(),
        area_type: AreaType::Polygon,
        radius_m: None,
        width_m: None,
        lower_limit_m: None,
        upper_limit_m: None,
        organizations: vec![],
        reasons: vec![],
    };
    repo.create(&polygon, env_id, "alice").unwrap();
}

#[test]
fn seeded_reasons_attach_to_zones_with_replace_set_semantics() {
    let (conn, env_id) = setup();
    let reasons = ReasonRepository::new(&conn);
    let air_traffic = reasons.get_by_name("AIR_TRAFFIC").unwrap().unwrap();
    let privacy = reasons.get_by_name("PRIVACY").unwrap().unwrap();

    let orgs = UhubOrgRepository::new(&conn);
    let org = orgs.create("Sevilla USSP", env_id, "alice").unwrap();

    let repo = UasZoneRepository::new(&conn);
    let mut input = circle_zone("LEZL CTR");
    input.organizations = vec![org.id];
    input.reasons = vec![air_traffic.id, privacy.id];
    let created = repo.create(&input, env_id, "alice").unwrap();
    assert_eq!(created.organizations.len(), 1);
    assert_eq!(created.reasons.len(), 2);

    // Replace the reason set wholesale; an empty list clears it.
    let updated = repo
        .update(
            created.zone.id,
            &UasZonePatch {
                reasons: Some(vec![privacy.id]),
                ..UasZonePatch::default()
            },
            "alice",
        )
        .unwrap();
    assert_eq!(updated.reasons.len(), 1);
    assert_eq!(updated.reasons[0].name, "PRIVACY");
    // Organizations were omitted from the patch and must be preserved.
    assert_eq!(updated.organizations.len(), 1);

    let cleared = repo
        .update(
            created.zone.id,
            &UasZonePatch {
                reasons: Some(vec![]),
                ..UasZonePatch::default()
            },
            "alice",
        )
        .unwrap();
    assert!(cleared.reasons.is_empty());
}

#[test]
fn update_geometry_revalidates_conditional_fields() {
    let (conn, env_id) = setup();
    let repo = UasZoneRepository::new(&conn);
    let created = repo.create(&circle_zone("LEZL CTR"), env_id, "alice").unwrap();

    // Switching to corridor without a width must fail.
    let err = repo
        .update(
            created.zone.id,
            &UasZonePatch {
                area_type: Some(AreaType::Corridor),
                ..UasZonePatch::default()
            },
            "alice",
        )
        .unwrap_err();
    assert!(err.to_string().contains("width_m"));

    let ok = repo
        .update(
            created.zone.id,
            &UasZonePatch {
                area_type: Some(AreaType::Corridor),
                width_m: Some(Some(80.0)),
                ..UasZonePatch::default()
            },
            "alice",
        )
        .unwrap();
    assert_eq!(ok.zone.area_type, AreaType::Corridor);
    assert_eq!(ok.zone.width_m, Some(80.0));
}

#[test]
fn zone_names_are_unique_per_environment() {
    let (conn, env_id) = setup();
    let other_env = EnvironmentRepository::new(&conn)
        .create(
            &NewEnvironment {
                name: "uat-b".to_string(),
                description: None,
            },
            "tester",
        )
        .unwrap()
        .id;
    let repo = UasZoneRepository::new(&conn);

    repo.create(&circle_zone("LEZL CTR"), env_id, "alice").unwrap();
    let duplicate = repo.create(&circle_zone("LEZL CTR"), env_id, "alice");
    assert!(duplicate.unwrap_err().is_unique_conflict());
    repo.create(&circle_zone("LEZL CTR"), other_env, "alice").unwrap();
}
