//! Protocol module - Nordic secure DFU serial protocol definitions.

pub mod constants;
pub mod request;
pub mod response;

pub use constants::*;
pub use request::Request;
pub use response::{
    CrcResponse, FirmwareVersionResponse, ResponseError, ResultCode, SelectResponse, check_header,
};
