//! A Rust client for popler, the catalog of long-term ecological population
//! studies from the US LTER network.
//!
//! The crate follows the `popler` workflow:
//! browse the project metadata, narrow it down with criteria or a keyword,
//! then download the observational records of the selected projects.
//!
//! ## Quick start
//! - Point the client at an API via `POPLER_URL` or a `.poplerrc` file
//!   (supported in the current directory and in your home directory); the
//!   public endpoint is used otherwise.
//! - Call [`browse`] with [`BrowseOptions`], then [`get_data`] on the result.
//!
//! ```no_run
//! use anyhow::Result;
//! use popler::{BrowseOptions, Client, GetDataOptions, Selection, browse, col, get_data};
//!
//! fn main() -> Result<()> {
//!     let client = Client::from_env()?;
//!     let poa = browse(
//!         &client,
//!         &BrowseOptions::new().criteria(col("genus").eq("Poa").and(col("species").eq("fendleriana"))),
//!     )?;
//!     let dataset = get_data(&client, Selection::Browsed(&poa), GetDataOptions::default())?;
//!     println!("{}", dataset.data);
//!     Ok(())
//! }
//! ```
//!
//! Criteria can also be written as text, e.g.
//! `Expr::parse("lterid == 'SEV' & studyendyr > 2000")`.

#![forbid(unsafe_code)]

mod api;
pub mod browse;
mod cache;
mod citation;
mod client;
mod config;
pub mod covariates;
pub mod data;
mod dictionary;
mod error;
pub mod expr;
pub mod nest;
mod persist;
pub mod schema;
mod source;
mod table;
mod util;

pub use browse::{
    BrowseOptions, ColumnSelection, KeywordMatch, browse, browse_table, browse_with,
    criteria_filter, keyword_filter, resolve_columns, select_columns,
};
pub use cache::{DEFAULT_MAX_AGE, MetadataCache, global_cache};
pub use citation::{Citation, citations, metadata_urls};
pub use client::{Client, ClientConfig};
pub use config::DEFAULT_URL;
pub use data::{Dataset, GetDataOptions, Selection, get_data, get_data_with};
pub use dictionary::{DictionaryEntry, dictionary};
pub use error::{Error, Result};
pub use expr::{CmpOp, Expr, col};
pub use nest::{NESTED_TAXA, flatten, nest_taxonomy, unnest};
pub use persist::{load_table, save_table};
pub use schema::{Category, Field, Schema, TaxonomySet, fields};
pub use source::{DataSource, MemorySource};
pub use table::{Table, Value};
