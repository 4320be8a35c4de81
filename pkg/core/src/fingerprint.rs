//! The cumulative fingerprint function `H` shared by every actor in the
//! pipeline: proxies hash what they stream, the agent hashes what it
//! collects, and the validator hashes what it replays. All three must
//! agree bit-for-bit, so this is the only place the hash is computed.

use sha2::{Digest, Sha256};

/// `H("")`: the fingerprint of an empty snapshot.
pub fn empty() -> String {
	hex::encode(Sha256::digest(b""))
}

/// `H(prev ‖ data)`, folding one record's data into the running hash.
pub fn fold(prev: &str, data: &str) -> String {
	let mut hasher = Sha256::new();
	hasher.update(prev.as_bytes());
	hasher.update(data.as_bytes());
	hex::encode(hasher.finalize())
}

/// Folds an entire sequence of records left-to-right starting from the
/// empty hash. Used by tests and by the validator's from-scratch replay.
pub fn fold_all<'a, I: IntoIterator<Item = &'a str>>(records: I) -> String {
	records.into_iter().fold(empty(), |acc, data| fold(&acc, data))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_hash_is_stable() {
		assert_eq!(empty(), empty());
		assert_eq!(empty().len(), 64);
	}

	#[test]
	fn fold_is_order_sensitive() {
		let ab = fold(&fold(&empty(), "a"), "b");
		let ba = fold(&fold(&empty(), "b"), "a");
		assert_ne!(ab, ba);
	}

	/// Splitting a sequence anywhere and folding each half separately
	/// must produce the same continuation hash as folding the whole
	/// sequence at once.
	#[test]
	fn linearity_across_a_split() {
		let records = ["x", "y", "z", "w"];
		let whole = fold_all(records.iter().copied());

		let mut running = empty();
		for r in &records[..2] {
			running = fold(&running, r);
		}
		for r in &records[2..] {
			running = fold(&running, r);
		}

		assert_eq!(whole, running);
	}
}
