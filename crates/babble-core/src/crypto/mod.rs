pub mod secret_codec;

pub use secret_codec::{CodecError, decrypt, encrypt};
