//! 📄 Decoders: bytes in, ordered rows out.
//!
//! The relay itself only cares about a sequence of [`RawRow`]s. Something has to
//! produce them from whatever landed in the bucket, and for now that something
//! speaks CSV.
//!
//! 🧠 Knowledge graph:
//! - `csv`: RFC-4180-ish reader. Header row first, `"` quoting, `.` in a header
//!   builds nesting (`name.first` → `{"name":{"first":..}}`) so the transformer
//!   has something to flatten.
//! - Every cell stays a string. Typing is the transformer's call (timestamps) or
//!   the remote API's (everything else).

mod csv;

pub use csv::decode_csv;
