//! # atomforge
//!
//! A declarative codec for fixed-layout binary records.
//!
//! ## Overview
//!
//! Game data files pack their records as raw little-endian structs: stat
//! blocks, evolution tables, terminated move lists. This library describes
//! such layouts as schema trees and drives both directions through them:
//!
//! - Schema nodes for scalars, padding, arrays, nested groups, derived
//!   values and cursor seeks
//! - Decoding a byte buffer into an ordered, editable record ([`Atom`])
//! - Re-encoding an edited record, patching stored offsets whose targets
//!   moved
//! - A registry of ready-made schemas keyed by game version
//!
//! ## Example - decode, edit, re-encode
//!
//! ```rust,no_run
//! use atomforge::{decode, FormatCode, FormatNode};
//!
//! fn main() -> atomforge::Result<()> {
//!     let schema = FormatNode::group(vec![
//!         FormatNode::scalar("hp", FormatCode::U8),
//!         FormatNode::scalar("atk", FormatCode::U8),
//!     ]);
//!
//!     let mut record = decode(&schema, &[45, 49])?;
//!     record.set("hp", 80)?;
//!
//!     let bytes = record.to_bytes()?;
//!     assert_eq!(bytes, [80, 49]);
//!     Ok(())
//! }
//! ```
//!
//! ## Example - registry schemas
//!
//! ```rust,no_run
//! use atomforge::{decode, schemas_for, GameVersion};
//!
//! fn main() -> atomforge::Result<()> {
//!     let schemas = schemas_for(GameVersion::Platinum);
//!     let raw = [0u8; 44]; // one record extracted by the container layer
//!     let record = decode(&schemas.personal, &raw)?;
//!     println!("base hp: {:?}", record.get_int("hp"));
//!     Ok(())
//! }
//! ```

pub mod atom;
pub mod cursor;
pub mod decode;
pub mod encode;
pub mod error;
pub mod registry;
pub mod schema;

pub use atom::{Atom, Value};
pub use decode::decode;
pub use encode::encode;
pub use error::{DecodeError, EncodeError, Error, Result, SchemaError};
pub use registry::{schemas_for, GameSchemas, GameVersion};
pub use schema::{
    AnchorRule, CountRule, DerivedOp, FieldRef, FieldRole, FormatCode, FormatNode, Node,
    OffsetRule, Operand,
};
