use skyuat_core::repo::environment::NewEnvironment;
use skyuat_core::repo::fleet::NewEmail;
use skyuat_core::repo::lookup::LookupInput;
use skyuat_core::repo::requirement::NewRequirement;
use skyuat_core::{DatabaseLocation, SessionFactory, UnitOfWork};

fn factory() -> SessionFactory {
    SessionFactory::initialize(DatabaseLocation::InMemory, false, false).unwrap()
}

#[test]
fn repositories_share_one_transaction_and_see_uncommitted_writes() {
    let sessions = factory();
    let mut uow = UnitOfWork::new(sessions.session().unwrap()).unwrap();

    let env = uow
        .environments()
        .create(
            &NewEnvironment {
                name: "uat".to_string(),
                description: None,
            },
            "alice",
        )
        .unwrap();
    let system = uow
        .systems()
        .create(&LookupInput {
            name: "USSP".to_string(),
            description: None,
        })
        .unwrap();
    let section = uow
        .sections()
        .create(&LookupInput {
            name: "Operational".to_string(),
            description: None,
        })
        .unwrap();

    // A second repository on the same unit of work observes the pending
    // lookup rows before any commit.
    let requirement = uow
        .requirements()
        .create(
            &NewRequirement {
                code: "REQ001".to_string(),
                definition: "Visible before commit.".to_string(),
                systems: vec![system.id],
                sections: vec![section.id],
            },
            env.id,
            "alice",
        )
        .unwrap();
    assert_eq!(requirement.systems[0].id, system.id);

    uow.commit().unwrap();
    uow.close().unwrap();

    sessions
        .with_unit_of_work(|uow| {
            assert!(uow
                .requirements()
                .get_by_code(env.id, "REQ001")
                .unwrap()
                .is_some());
            Ok(())
        })
        .unwrap();
}

#[test]
fn rollback_reverts_every_repository_write() {
    let sessions = factory();
    let mut uow = UnitOfWork::new(sessions.session().unwrap()).unwrap();

    let env = uow
        .environments()
        .create(
            &NewEnvironment {
                name: "uat".to_string(),
                description: None,
            },
            "alice",
        )
        .unwrap();
    uow.emails()
        .create(
            &NewEmail {
                address: "pilot@example.com".to_string(),
            },
            env.id,
            "alice",
        )
        .unwrap();

    uow.rollback().unwrap();
    uow.close().unwrap();

    sessions
        .with_unit_of_work(|uow| {
            assert!(uow.environments().get_by_name("uat").unwrap().is_none());
            assert!(uow.emails().get_all().unwrap().is_empty());
            Ok(())
        })
        .unwrap();
}

#[test]
fn failed_second_write_leaves_nothing_after_rollback() {
    let sessions = factory();
    let mut uow = UnitOfWork::new(sessions.session().unwrap()).unwrap();

    let env = uow
        .environments()
        .create(
            &NewEnvironment {
                name: "uat".to_string(),
                description: None,
            },
            "alice",
        )
        .unwrap();
    let input = NewEmail {
        address: "pilot@example.com".to_string(),
    };
    uow.emails().create(&input, env.id, "alice").unwrap();

    // Second write violates the per-environment unique constraint.
    let err = uow.emails().create(&input, env.id, "alice").unwrap_err();
    assert!(err.is_unique_conflict());

    uow.rollback().unwrap();
    uow.close().unwrap();

    // The first write must not survive: the transaction was atomic.
    sessions
        .with_unit_of_work(|uow| {
            assert!(uow.emails().get_all().unwrap().is_empty());
            Ok(())
        })
        .unwrap();
}

#[test]
fn scoped_helper_releases_the_session_on_error_paths() {
    let sessions = factory();

    let result: Result<(), skyuat_core::RepoError> = sessions.with_unit_of_work(|uow| {
        uow.environments()
            .create(
                &NewEnvironment {
                    name: "uat".to_string(),
                    description: None,
                },
                "alice",
            )
            .map(|_| ())?;
        Err(skyuat_core::RepoError::Validation("forced failure".to_string()))
    });
    assert!(result.is_err());

    // The shared session must be back in the slot, and the aborted work
    // must have been rolled back on close.
    sessions
        .with_unit_of_work(|uow| {
            assert!(uow.environments().get_by_name("uat").unwrap().is_none());
            Ok(())
        })
        .unwrap();
}

#[test]
fn drop_without_close_rolls_back_and_returns_the_session() {
    let sessions = factory();

    {
        let uow = UnitOfWork::new(sessions.session().unwrap()).unwrap();
        uow.environments()
            .create(
                &NewEnvironment {
                    name: "leaked".to_string(),
                    description: None,
                },
                "alice",
            )
            .unwrap();
        // Dropped here without close().
    }

    sessions
        .with_unit_of_work(|uow| {
            assert!(uow.environments().get_by_name("leaked").unwrap().is_none());
            Ok(())
        })
        .unwrap();
}

#[test]
fn commit_persists_all_writes_atomically() {
    let sessions = factory();

    sessions
        .with_unit_of_work(|uow| {
            let env = uow
                .environments()
                .create(
                    &NewEnvironment {
                        name: "uat".to_string(),
                        description: None,
                    },
                    "alice",
                )
                .unwrap();
            uow.emails()
                .create(
                    &NewEmail {
                        address: "a@example.com".to_string(),
                    },
                    env.id,
                    "alice",
                )
                .unwrap();
            uow.emails()
                .create(
                    &NewEmail {
                        address: "b@example.com".to_string(),
                    },
                    env.id,
                    "alice",
                )
                .unwrap();
            uow.commit()
        })
        .unwrap();

    sessions
        .with_unit_of_work(|uow| {
            assert_eq!(uow.emails().get_all().unwrap().len(), 2);
            Ok(())
        })
        .unwrap();
}
