pub mod config;
pub mod feed_codec;
pub mod flashscore;
pub mod http_client;
pub mod notify;
pub mod persist;
pub mod pipeline;
pub mod prediction;
pub mod probability;
pub mod registry;
pub mod results_store;
pub mod retry;
pub mod scheduler;
pub mod team_stats;
pub mod tracker;
