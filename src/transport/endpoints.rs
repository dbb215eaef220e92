//! Paths of the wallet service api, relative to the configured base url

pub const JWT_TOKEN: &str = "/api/v1/auth/jwt-token";
pub const REFRESH: &str = "/api/v1/auth/refresh";

pub const BALANCE: &str = "/api/v1/user/wallet/balance";
pub const LEGACY_ADDRESS: &str = "/api/v1/bsv/legacy-address";
pub const NFTS_INFO: &str = "/api/v1/user/nfts/info";
pub const NFT_DATA_PREFIX: &str = "/api/v1/nft/data/";

pub const NFT_PAYMAIL_SEND: &str = "/api/v1/nft/paymail/send";
pub const BSV_PAYMAIL_SEND: &str = "/api/v1/bsv/paymail/send";
pub const NFT_CREATE: &str = "/api/v1/nft/create";

pub fn nft_data(origin: &str) -> String {
    format!("{}{}", NFT_DATA_PREFIX, origin)
}
