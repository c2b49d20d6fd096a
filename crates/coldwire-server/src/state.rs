use std::sync::Arc;

use coldwire_identity::IdentityService;
use coldwire_relay::RelayService;
use coldwire_storage::Storage;

#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<IdentityService>,
    pub relay: Arc<RelayService>,
    pub storage: Arc<dyn Storage>,
    pub jwt_secret: Arc<Vec<u8>>,
}
