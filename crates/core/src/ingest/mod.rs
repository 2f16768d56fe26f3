pub mod demo;
pub mod provider;

use crate::config::Settings;
use crate::ingest::demo::{DemoSnapshotProvider, DEMO_CLIENT_ID};
use crate::ingest::provider::{HttpJsonSnapshotProvider, SnapshotProvider};
use anyhow::Result;
use uuid::Uuid;

/// Picks the data source for a client: synthetic data in demo mode or for the demo client,
/// the configured HTTP source otherwise.
pub struct SnapshotSources {
    demo: DemoSnapshotProvider,
    live: Option<HttpJsonSnapshotProvider>,
    demo_mode: bool,
}

impl SnapshotSources {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let live = match settings.snapshot_provider_base_url {
            Some(_) => Some(HttpJsonSnapshotProvider::from_settings(settings)?),
            None => None,
        };
        Ok(Self {
            demo: DemoSnapshotProvider,
            live,
            demo_mode: settings.demo_mode,
        })
    }

    pub fn demo_only() -> Self {
        Self {
            demo: DemoSnapshotProvider,
            live: None,
            demo_mode: true,
        }
    }

    pub fn for_client(&self, client_id: Uuid) -> Result<&dyn SnapshotProvider> {
        if self.demo_mode || client_id == DEMO_CLIENT_ID {
            return Ok(&self.demo);
        }
        match &self.live {
            Some(live) => Ok(live),
            None => anyhow::bail!(
                "no snapshot source configured for client {client_id} (set SNAPSHOT_PROVIDER_BASE_URL or CLEARSIGHT_DEMO_MODE=true)"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_client_always_gets_demo_data() {
        let sources = SnapshotSources {
            demo: DemoSnapshotProvider,
            live: None,
            demo_mode: false,
        };
        let p = sources.for_client(DEMO_CLIENT_ID).unwrap();
        assert_eq!(p.provider_name(), "demo");
        assert!(sources.for_client(Uuid::new_v4()).is_err());
    }

    #[test]
    fn demo_mode_covers_every_client() {
        let sources = SnapshotSources::demo_only();
        assert_eq!(sources.for_client(Uuid::new_v4()).unwrap().provider_name(), "demo");
    }
}
