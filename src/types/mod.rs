pub mod conversions;

pub use conversions::{
    string_to_address, u256_decimal, u256_div_10_pow, u256_to_f64, ConversionError,
};
