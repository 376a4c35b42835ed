pub mod backend;
mod classify;
pub mod fetcher;

pub use backend::HttpChatBackend;
pub use fetcher::ReqwestFetcher;
