pub mod dispatcher;
pub mod matching;
pub mod ranking;
