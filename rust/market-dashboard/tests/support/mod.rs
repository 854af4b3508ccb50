#[allow(dead_code)]
mod fixture;
#[allow(dead_code)]
mod harness;

#[allow(unused_imports)]
pub use fixture::*;
#[allow(unused_imports)]
pub use harness::*;
