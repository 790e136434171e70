pub mod db;
pub mod mutation_log;
pub mod remote;
pub mod schedule_store;
