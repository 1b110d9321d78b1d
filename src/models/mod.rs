pub mod availability;
pub mod job;
pub mod match_result;
pub mod reputation;
pub mod skill;
pub mod worker;
