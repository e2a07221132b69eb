
pub mod logging;
pub mod gain;
pub mod resolve;
pub mod args;
pub mod eer;
pub mod shifts;
