use std::sync::Arc;

pub use self::actions::ActionDispatcher;
pub use self::session::WalletSession;
pub use self::token_store::TokenStore;
pub use self::wallet_data::WalletDataAggregator;
use crate::external::{HttpConnection, Storage};
use crate::models::WalletConfig;
use crate::transport::{AuthenticatedFetcher, Transport};

pub mod actions;
pub use super::models;
pub mod parsing;
pub mod session;
pub mod token_store;
pub mod wallet_data;

/// Wallet client assembled over host implementations.
///
/// All components share one [`AuthenticatedFetcher`] and therefore one
/// token store.
pub struct WalletInterface {
    session: WalletSession,
    wallet_data: Arc<WalletDataAggregator>,
    actions: ActionDispatcher,
}

impl WalletInterface {
    pub async fn new(
        connection: Arc<dyn HttpConnection>,
        storage: Arc<dyn Storage>,
        config: WalletConfig,
    ) -> Self {
        let tokens = Arc::new(TokenStore::new(storage.clone()));
        let transport: Arc<dyn Transport> =
            Arc::new(AuthenticatedFetcher::new(connection, tokens.clone()));

        let session = WalletSession::restore(transport.clone(), tokens, storage).await;
        let wallet_data = Arc::new(WalletDataAggregator::new(transport.clone(), &config));
        let actions = ActionDispatcher::new(transport, wallet_data.clone(), config.app_name);

        Self {
            session,
            wallet_data,
            actions,
        }
    }

    pub fn session(&self) -> &WalletSession {
        &self.session
    }

    pub fn wallet_data(&self) -> &WalletDataAggregator {
        &self.wallet_data
    }

    pub fn actions(&self) -> &ActionDispatcher {
        &self.actions
    }
}
