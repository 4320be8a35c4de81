#[macro_use] extern crate error_chain;

extern crate chrono;
extern crate clap;
extern crate notify;
extern crate logwarden_wire as wire;

pub mod errors {
	error_chain! {
		links {
			Wire(::wire::errors::Error, ::wire::errors::ErrorKind);
		}
		foreign_links {
			Io(::std::io::Error);
			Notify(::notify::Error);
		}
	}
}

pub mod config;
pub mod watch;
pub mod content;
pub mod connection;
