//! Logged-in entry point: credentials, shelves, journal, single books.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::{info, instrument};

use storygraph_session::markup::main_html;
use storygraph_session::{Form, FromFragment, Pager, Session};
use storygraph_shared::{Credentials, Result, SessionConfig, StoryGraphError};

use crate::book::Book;
use crate::entry::Entry;

/// Path of the ISBN import page and its form action.
const IMPORT_PATH: &str = "/import-book-isbn";

/// Container class of search and edition listings.
pub(crate) const SEARCH_RESULTS: &str = "search-results-books-panes";

/// A per-user book listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shelf {
    Owned,
    ToRead,
    Current,
    Read,
}

impl Shelf {
    pub const ALL: [Self; 4] = [Self::Owned, Self::ToRead, Self::Current, Self::Read];

    /// Listing path for `username`.
    pub fn path(self, username: &str) -> String {
        let prefix = match self {
            Self::Owned => "owned-books",
            Self::ToRead => "to-read",
            Self::Current => "currently-reading",
            Self::Read => "books-read",
        };
        format!("/{prefix}/{username}")
    }

    /// Class of the element holding the listing's book cards.
    pub fn container(self) -> &'static str {
        match self {
            Self::Owned => "owned-books-panes",
            Self::ToRead => "to-read-books-panes",
            Self::Current | Self::Read => "read-books-panes",
        }
    }
}

impl FromStr for Shelf {
    type Err = StoryGraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "owned" => Ok(Self::Owned),
            "to-read" => Ok(Self::ToRead),
            "current" => Ok(Self::Current),
            "read" => Ok(Self::Read),
            other => Err(StoryGraphError::parse(format!("unknown shelf {other:?}"))),
        }
    }
}

impl fmt::Display for Shelf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Owned => "owned",
            Self::ToRead => "to-read",
            Self::Current => "current",
            Self::Read => "read",
        })
    }
}

/// A logged-in session together with the credentials file it came from.
///
/// Call [`save`](StoryGraph::save) before dropping to persist the session
/// cookie for the next run.
pub struct StoryGraph {
    session: Session,
    credentials: Credentials,
    credentials_path: PathBuf,
    username: String,
}

impl StoryGraph {
    /// Load the credentials file named by `config` and log in.
    pub async fn open(config: &SessionConfig) -> Result<Self> {
        let credentials = Credentials::load(&config.credentials_path)?;
        Self::with_credentials(config, credentials).await
    }

    /// Log in with already loaded credentials, reusing their cookie if any.
    #[instrument(skip_all, fields(base_url = %config.base_url))]
    pub async fn with_credentials(config: &SessionConfig, credentials: Credentials) -> Result<Self> {
        let session = Session::new(config)?;
        if let Some(cookie) = credentials.session_cookie() {
            session.set_cookie(cookie);
        }

        let username = session
            .login(&credentials.email, &credentials.password)
            .await?;

        Ok(Self {
            session,
            credentials,
            credentials_path: config.credentials_path.clone(),
            username,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Write the current session cookie back to the credentials file.
    pub fn save(&mut self) -> Result<()> {
        self.credentials.cookie = self.session.cookie();
        self.credentials.save(&self.credentials_path)
    }

    /// A book by its site path (`/books/<id>`).
    pub async fn book(&self, path: &str) -> Result<Book> {
        Book::fetch(&self.session, path).await
    }

    /// Import a book by ISBN and return the resulting book page.
    #[instrument(skip_all, fields(isbn = %isbn))]
    pub async fn import_book(&self, isbn: &str) -> Result<Book> {
        let page = self.session.get(IMPORT_PATH).await?;
        let form = {
            let doc = self.session.parse(&page);
            Form::find(&doc, &format!(r#"main form[action="{IMPORT_PATH}"]"#))?
        };

        let page = self
            .session
            .submit(&form, vec![("isbn".to_string(), isbn.to_string())], false)
            .await?;
        let main = {
            let doc = self.session.parse(&page);
            main_html(&doc)?
        };

        info!(url = %page.url, "imported book");
        Ok(Book::from_fragment(self.session.clone(), main))
    }

    /// Search results, or the default browse listing without a search term.
    pub fn browse_books(&self, search: Option<&str>) -> Pager<Book> {
        let query = search
            .map(|term| vec![("search_term".to_string(), term.to_string())])
            .unwrap_or_default();
        self.session.paged("/browse", SEARCH_RESULTS, query)
    }

    /// Books on one of the user's shelves.
    pub fn shelf(&self, shelf: Shelf) -> Pager<Book> {
        self.session
            .paged(&shelf.path(&self.username), shelf.container(), Vec::new())
    }

    pub fn owned_books(&self) -> Pager<Book> {
        self.shelf(Shelf::Owned)
    }

    pub fn to_read_books(&self) -> Pager<Book> {
        self.shelf(Shelf::ToRead)
    }

    pub fn current_books(&self) -> Pager<Book> {
        self.shelf(Shelf::Current)
    }

    pub fn read_books(&self) -> Pager<Book> {
        self.shelf(Shelf::Read)
    }

    /// The user's reading journal, newest first.
    pub fn journal(&self) -> Pager<Entry> {
        self.session.paged("/journal", "journal-entry-panes", Vec::new())
    }
}

impl fmt::Debug for StoryGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoryGraph")
            .field("username", &self.username)
            .field("credentials_path", &self.credentials_path)
            .finish_non_exhaustive()
    }
}
