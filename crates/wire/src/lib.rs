// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC protocol for core communication.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod codes;
mod contracts;
mod framing;

pub use codes::*;
pub use contracts::{CoreRequest, CoreResponse, ErrorBody};
pub use framing::{
    decode_request, decode_response, encode_request, encode_response, read_request,
    read_response, write_request, write_response, ProtocolError, MAX_FRAME_LEN,
};
