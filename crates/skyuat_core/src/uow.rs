//! Unit of work: one session, one transaction, all repositories.
//!
//! # Responsibility
//! - Bind every repository family to one session so they observe each
//!   other's uncommitted writes.
//! - Provide commit/rollback/close with release guaranteed on every exit
//!   path.
//!
//! # Invariants
//! - An IMMEDIATE transaction is open from construction until commit or
//!   rollback; repositories never open their own.
//! - `commit` failure rolls the transaction back before the error
//!   propagates; no partial commit is possible.
//! - Drop rolls back and releases if the caller never called `close`.

use crate::db::DbResult;
use crate::repo::block::BlockRepository;
use crate::repo::bug::BugRepository;
use crate::repo::campaign::CampaignRepository;
use crate::repo::environment::EnvironmentRepository;
use crate::repo::file::FileRepository;
use crate::repo::fleet::{DroneRepository, EmailRepository, OperatorRepository};
use crate::repo::lookup::{ReasonRepository, SectionRepository, SystemRepository};
use crate::repo::requirement::RequirementRepository;
use crate::repo::run::{CampaignRunRepository, CaseRunRepository, StepRunRepository};
use crate::repo::testcase::{CaseRepository, StepRepository};
use crate::repo::uhub::{UhubOrgRepository, UhubUserRepository};
use crate::repo::zone::UasZoneRepository;
use crate::repo::RepoResult;
use crate::session::{Session, SessionFactory};
use log::{error, warn};
use rusqlite::Connection;

pub struct UnitOfWork {
    session: Option<Session>,
    tx_open: bool,
}

impl UnitOfWork {
    /// Opens an IMMEDIATE transaction on the session and takes ownership
    /// of its lifecycle.
    pub fn new(session: Session) -> RepoResult<Self> {
        if let Err(err) = session.connection().execute_batch("BEGIN IMMEDIATE;") {
            // The session must go back to its slot even when the
            // transaction never opened.
            if let Err(release_err) = session.release() {
                warn!("event=uow_new module=uow status=release_error error={release_err}");
            }
            return Err(err.into());
        }
        Ok(Self {
            session: Some(session),
            tx_open: true,
        })
    }

    fn conn(&self) -> &Connection {
        match &self.session {
            Some(session) => session.connection(),
            // The session is only taken by close()/Drop, both of which
            // consume or end the value.
            None => unreachable!("unit of work used after close"),
        }
    }

    pub fn environments(&self) -> EnvironmentRepository<'_> {
        EnvironmentRepository::new(self.conn())
    }

    pub fn systems(&self) -> SystemRepository<'_> {
        SystemRepository::new(self.conn())
    }

    pub fn sections(&self) -> SectionRepository<'_> {
        SectionRepository::new(self.conn())
    }

    pub fn reasons(&self) -> ReasonRepository<'_> {
        ReasonRepository::new(self.conn())
    }

    pub fn emails(&self) -> EmailRepository<'_> {
        EmailRepository::new(self.conn())
    }

    pub fn operators(&self) -> OperatorRepository<'_> {
        OperatorRepository::new(self.conn())
    }

    pub fn drones(&self) -> DroneRepository<'_> {
        DroneRepository::new(self.conn())
    }

    pub fn uhub_orgs(&self) -> UhubOrgRepository<'_> {
        UhubOrgRepository::new(self.conn())
    }

    pub fn uhub_users(&self) -> UhubUserRepository<'_> {
        UhubUserRepository::new(self.conn())
    }

    pub fn uas_zones(&self) -> UasZoneRepository<'_> {
        UasZoneRepository::new(self.conn())
    }

    pub fn requirements(&self) -> RequirementRepository<'_> {
        RequirementRepository::new(self.conn())
    }

    pub fn cases(&self) -> CaseRepository<'_> {
        CaseRepository::new(self.conn())
    }

    pub fn steps(&self) -> StepRepository<'_> {
        StepRepository::new(self.conn())
    }

    pub fn blocks(&self) -> BlockRepository<'_> {
        BlockRepository::new(self.conn())
    }

    pub fn campaigns(&self) -> CampaignRepository<'_> {
        CampaignRepository::new(self.conn())
    }

    pub fn campaign_runs(&self) -> CampaignRunRepository<'_> {
        CampaignRunRepository::new(self.conn())
    }

    pub fn case_runs(&self) -> CaseRunRepository<'_> {
        CaseRunRepository::new(self.conn())
    }

    pub fn step_runs(&self) -> StepRunRepository<'_> {
        StepRunRepository::new(self.conn())
    }

    pub fn bugs(&self) -> BugRepository<'_> {
        BugRepository::new(self.conn())
    }

    pub fn files(&self) -> FileRepository<'_> {
        FileRepository::new(self.conn())
    }

    /// Commits all pending changes atomically.
    ///
    /// When the store rejects the transaction the rollback runs first and
    /// the native error propagates unchanged.
    pub fn commit(&mut self) -> RepoResult<()> {
        if !self.tx_open {
            return Ok(());
        }
        match self.conn().execute_batch("COMMIT;") {
            Ok(()) => {
                self.tx_open = false;
                Ok(())
            }
            Err(err) => {
                // A failed COMMIT (e.g. deferred constraint) can leave the
                // transaction active; roll it back so nothing survives.
                if let Err(rollback_err) = self.conn().execute_batch("ROLLBACK;") {
                    warn!(
                        "event=uow_commit module=uow status=rollback_error error={rollback_err}"
                    );
                }
                self.tx_open = false;
                Err(err.into())
            }
        }
    }

    /// Discards all uncommitted changes.
    pub fn rollback(&mut self) -> RepoResult<()> {
        if !self.tx_open {
            return Ok(());
        }
        self.conn().execute_batch("ROLLBACK;")?;
        self.tx_open = false;
        Ok(())
    }

    /// Rolls back any open transaction and releases the session.
    ///
    /// Release errors are reported to the caller; `Drop` would only be
    /// able to log them.
    pub fn close(mut self) -> DbResult<()> {
        self.finish()
    }

    fn finish(&mut self) -> DbResult<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        if self.tx_open {
            if let Err(err) = session.connection().execute_batch("ROLLBACK;") {
                warn!("event=uow_close module=uow status=rollback_error error={err}");
            }
            self.tx_open = false;
        }
        session.release()
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if let Err(err) = self.finish() {
            error!("event=uow_drop module=uow status=error error={err}");
        }
    }
}

impl SessionFactory {
    /// Scoped unit-of-work acquisition: yields a fresh unit of work and
    /// guarantees release on every exit path. A close failure after a
    /// successful block is logged, not raised; the block's own error
    /// always propagates.
    pub fn with_unit_of_work<T>(
        &self,
        f: impl FnOnce(&mut UnitOfWork) -> RepoResult<T>,
    ) -> RepoResult<T> {
        let mut uow = UnitOfWork::new(self.session()?)?;
        let result = f(&mut uow);
        if let Err(err) = uow.close() {
            warn!("event=uow_scope module=uow status=close_error error={err}");
        }
        result
    }
}
