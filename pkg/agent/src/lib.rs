#[macro_use] extern crate serde_derive;
#[macro_use] extern crate error_chain;

extern crate logwarden_core as logcore;
extern crate logwarden_wire as wire;
extern crate reqwest;
extern crate serde_json;
extern crate clap;
extern crate socket2;

pub mod errors {
	error_chain! {
		links {
			Wire(::wire::errors::Error, ::wire::errors::ErrorKind);
		}
		foreign_links {
			Io(::std::io::Error);
			Http(::reqwest::Error);
			Json(::serde_json::Error);
		}
	}
}

pub mod config;
pub mod backend;
pub mod content_request;
pub mod collector;
pub mod connection;
pub mod registry;
pub mod fanout;
pub mod agent;
pub mod scheduler;
pub mod validator;
