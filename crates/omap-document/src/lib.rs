//! # omap documents
//!
//! Declarative mapping documents for the omap kernel. A document (TOML or
//! JSON) declares class types and their members, constant dependencies, and
//! the mapping rules between types; [`CompiledDocument`] turns it into a type
//! registry, a validated rule set and a resolver serving the constants.
//!
//! ```toml
//! [[types]]
//! name = "Order"
//! members = [{ name = "Id", type = "i32" }, { name = "Lines", type = "list<Line>" }]
//!
//! [[rules]]
//! source = "Order"
//! target = "Invoice"
//! map_all = true
//! except = ["Note"]
//! ```
//!
//! Object graphs cross the process boundary as JSON through [`codec`].

pub mod codec;
pub mod compile;
pub mod error;
pub mod model;
pub mod resolver;
pub mod type_expr;

pub use codec::{TYPE_KEY, decode, encode};
pub use compile::{CompiledDocument, load_document, parse_json, parse_toml};
pub use error::DocumentError;
pub use model::{
    DependencyDecl, DependencyRef, DocumentOptions, LinkDecl, MappingDocument, MemberDecl,
    PropertyDecl, RuleDecl, TypeDecl, TypeDeclKind,
};
pub use resolver::DocumentResolver;
pub use type_expr::{TypeExpr, resolve_type};
