//! IMAP protocol parsing, split into two layers:
//!
//! - [`lexer::TokenStream`] (component B): a refill-aware, ring-buffered
//!   tokeniser sitting directly on the wire, responsible for literal
//!   splicing and the one-token pushback the engine needs to decide a
//!   response's shape before committing to parsing it.
//! - [`response`]: structural parsing of one already-assembled response
//!   line (built on [`lexer::LineLexer`], a plain borrowed-slice lexer —
//!   no refilling, since by the time a line reaches here it's complete).
//!
//! # Example
//!
//! ```
//! use mailcore_imap::parser::{ResponseParser, Response, UntaggedResponse};
//!
//! let input = b"* OK IMAP4rev1 server ready\r\n";
//! let response = ResponseParser::parse(input).unwrap();
//!
//! match response {
//!     Response::Untagged(UntaggedResponse::Ok { text, .. }) => {
//!         assert!(text.contains("IMAP4rev1"));
//!     }
//!     _ => panic!("Expected untagged OK"),
//! }
//! ```

pub mod lexer;
pub mod response;

pub use lexer::{LineLexer, LineToken, Token, TokenStream};
pub use response::{
    Address, BodyStructure, Envelope, FetchItem, Response, ResponseParser, StatusItem,
    UntaggedResponse,
};
