
#![allow(unused)]

pub mod cmd;
pub mod gain;
