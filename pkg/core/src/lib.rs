#[macro_use] extern crate serde_derive;
#[macro_use] extern crate error_chain;

extern crate sha2;
extern crate hex;
extern crate chrono;

pub mod errors {
	error_chain! {}
}

pub mod fingerprint;
pub mod model;
