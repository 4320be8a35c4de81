#[macro_use] extern crate serde_derive;
#[macro_use] extern crate error_chain;

extern crate byteorder;
extern crate chrono;
extern crate rmp_serde as rmps;

pub mod errors {
	error_chain! {
		foreign_links {
			Io(::std::io::Error);
			Encode(::rmps::encode::Error);
			Decode(::rmps::decode::Error);
		}

		errors {
			/// Raised on malformed or out-of-contract wire data. The
			/// surrounding layer terminates the connection on this error.
			ProtocolViolation(msg: String) {
				description("protocol violation")
				display("protocol violation: {}", msg)
			}
			/// A recv of zero bytes: the remote end closed the socket.
			ConnectionLost {
				description("connection lost")
				display("connection lost")
			}
		}
	}
}

pub mod protocol;
pub mod socket;
pub mod connection;
