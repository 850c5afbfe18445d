use skyuat_core::db::open_db_in_memory;
use skyuat_core::repo::environment::{EnvironmentRepository, NewEnvironment};
use skyuat_core::repo::fleet::{
    DroneRepository, EmailRepository, NewDrone, NewEmail, NewOperator, OperatorRepository,
};
use skyuat_core::RepoError;

fn create_environment(conn: &rusqlite::Connection, name: &str) -> i64 {
    EnvironmentRepository::new(conn)
        .create(
            &NewEnvironment {
                name: name.to_string(),
                description: None,
            },
            "tester",
        )
        .unwrap()
        .id
}

#[test]
fn delete_of_referenced_email_is_restricted_until_operator_goes() {
    let conn = open_db_in_memory().unwrap();
    let env_id = create_environment(&conn, "uat");
    let emails = EmailRepository::new(&conn);
    let operators = OperatorRepository::new(&conn);

    let email = emails
        .create(
            &NewEmail {
                address: "pilot@example.com".to_string(),
            },
            env_id,
            "alice",
        )
        .unwrap();
    let operator = operators
        .create(
            &NewOperator {
                name: "AeroOps".to_string(),
                email_id: email.id,
                easa_id: None,
            },
            env_id,
            "alice",
        )
        .unwrap();

    let blocked = emails.delete(email.id).unwrap_err();
    assert!(blocked.is_foreign_key_conflict());
    // The row must be intact after the failed delete.
    assert!(emails.get_by_id(email.id).unwrap().is_some());

    assert!(operators.delete(operator.id).unwrap());
    assert!(emails.delete(email.id).unwrap());
    assert!(emails.get_by_id(email.id).unwrap().is_none());
}

#[test]
fn delete_of_referenced_operator_is_restricted_while_drones_exist() {
    let conn = open_db_in_memory().unwrap();
    let env_id = create_environment(&conn, "uat");
    let emails = EmailRepository::new(&conn);
    let operators = OperatorRepository::new(&conn);
    let drones = DroneRepository::new(&conn);

    let email = emails
        .create(
            &NewEmail {
                address: "ops@example.com".to_string(),
            },
            env_id,
            "alice",
        )
        .unwrap();
    let operator = operators
        .create(
            &NewOperator {
                name: "AeroOps".to_string(),
                email_id: email.id,
                easa_id: Some("ESP-OP-123".to_string()),
            },
            env_id,
            "alice",
        )
        .unwrap();
    let drone = drones
        .create(
            &NewDrone {
                name: "M300-01".to_string(),
                serial_number: Some("SN-0001".to_string()),
                operator_id: operator.id,
            },
            env_id,
            "alice",
        )
        .unwrap();

    assert!(operators.delete(operator.id).unwrap_err().is_foreign_key_conflict());

    assert!(drones.delete(drone.id).unwrap());
    assert!(operators.delete(operator.id).unwrap());
}

#[test]
fn delete_missing_rows_return_false_without_error() {
    let conn = open_db_in_memory().unwrap();
    create_environment(&conn, "uat");

    assert!(!EmailRepository::new(&conn).delete(77).unwrap());
    assert!(!OperatorRepository::new(&conn).delete(77).unwrap());
    assert!(!DroneRepository::new(&conn).delete(77).unwrap());
}

#[test]
fn email_address_format_and_uniqueness_are_enforced() {
    let conn = open_db_in_memory().unwrap();
    let env_a = create_environment(&conn, "uat-a");
    let env_b = create_environment(&conn, "uat-b");
    let emails = EmailRepository::new(&conn);

    let malformed = emails
        .create(
            &NewEmail {
                address: "not-an-address".to_string(),
            },
            env_a,
            "alice",
        )
        .unwrap_err();
    assert!(matches!(malformed, RepoError::Validation(_)));

    let input = NewEmail {
        address: "pilot@example.com".to_string(),
    };
    emails.create(&input, env_a, "alice").unwrap();

    let duplicate = emails.create(&input, env_a, "alice").unwrap_err();
    assert!(duplicate.is_unique_conflict());

    // Same address in another environment is a distinct row.
    emails.create(&input, env_b, "alice").unwrap();
}

#[test]
fn dangling_operator_reference_is_a_lookup_failure() {
    let conn = open_db_in_memory().unwrap();
    let env_id = create_environment(&conn, "uat");

    let err = DroneRepository::new(&conn)
        .create(
            &NewDrone {
                name: "M300-01".to_string(),
                serial_number: None,
                operator_id: 9001,
            },
            env_id,
            "alice",
        )
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::NotFound {
            entity: "operator",
            id: 9001
        }
    ));
}

#[test]
fn environment_get_or_create_returns_existing_row_second_time() {
    let conn = open_db_in_memory().unwrap();
    let repo = EnvironmentRepository::new(&conn);

    let (first, created) = repo.get_or_create("staging", "alice").unwrap();
    assert!(created);

    let (second, created_again) = repo.get_or_create("staging", "bob").unwrap();
    assert!(!created_again);
    assert_eq!(first.id, second.id);
    // The existing row is returned untouched.
    assert_eq!(second.audit.modified_by, "alice");
}
