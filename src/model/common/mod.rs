pub mod audit;
pub mod citizen;
pub mod election;
pub mod governorate;
pub mod role;
