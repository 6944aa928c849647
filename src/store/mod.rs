pub mod captains;
pub mod connections;
pub mod interest;
pub mod locations;
