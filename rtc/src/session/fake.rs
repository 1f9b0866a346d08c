//! A session over in-process loopback transports.

use std::sync::Arc;

use base::Thread;

use crate::configuration::setting_engine::SettingEngine;
use crate::session::Session;
use crate::transport::fake::FakeTransportFactory;

/// Pairs a [`Session`] with the [`FakeTransportFactory`] its transports come
/// from, so two sessions in one process can be wired to each other.
pub struct FakeSession {
    session: Arc<Session>,
    factory: Arc<FakeTransportFactory>,
}

impl FakeSession {
    pub fn new(
        sid: &str,
        initiator: bool,
        signaling: &Thread,
        worker: &Thread,
        setting_engine: SettingEngine,
    ) -> Self {
        let factory = Arc::new(FakeTransportFactory::new(worker.clone()));
        let session = Session::new(
            sid,
            initiator,
            signaling.clone(),
            worker.clone(),
            Arc::clone(&factory) as _,
            setting_engine,
        );
        FakeSession { session, factory }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn factory(&self) -> &Arc<FakeTransportFactory> {
        &self.factory
    }

    /// Connects every transport created so far to its counterpart in `other`.
    pub fn connect(&self, other: &FakeSession) {
        self.factory.connect(&other.factory);
    }
}
