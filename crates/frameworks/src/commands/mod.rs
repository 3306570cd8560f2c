pub mod check;
pub mod cluster;
pub mod diag;
pub mod edge;
pub mod services;
