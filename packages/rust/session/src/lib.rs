//! Scraping session for The StoryGraph's server-rendered pages.
//!
//! This crate provides:
//! - [`Session`]: cookie jar, CSRF token lifecycle, login, requests
//! - [`Form`] / [`MethodLink`]: resubmitting the site's own forms and
//!   `data-method` links
//! - [`Pager`]: listings paginated through `#next_link`
//! - [`markup`]: `scraper` helpers shared with the models

pub mod form;
pub mod markup;
pub mod pager;
pub mod session;

pub use form::{Fields, Form, MethodLink};
pub use pager::{FromFragment, Listing, Pager};
pub use session::{Page, SESSION_COOKIE, Session};
