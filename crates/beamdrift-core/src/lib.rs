pub mod consts;
pub mod correlation;
pub mod damage;
pub mod error;
pub mod fsc;
pub mod geometry;
pub mod io;
pub mod motion;
pub mod pipeline;
pub mod search;
pub mod spectrum;
pub mod synthetic;
