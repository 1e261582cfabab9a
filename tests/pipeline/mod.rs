mod chain;
mod client;
mod redis_store;
