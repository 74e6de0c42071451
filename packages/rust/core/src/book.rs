//! A book, as rendered on its own page or as a card in a listing.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html};
use tracing::{debug, instrument};

use storygraph_session::markup::{child_elements, select_first, selector, text_of};
use storygraph_session::{Form, FromFragment, MethodLink, Pager, Session};
use storygraph_shared::{Result, StoryGraphError};

use crate::client::SEARCH_RESULTS;
use crate::read::Read;

/// Matches a text node like `423 pages`.
static PAGES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s+pages$").expect("pages regex"));

/// Field values the site uses for "unknown".
const UNKNOWN_VALUES: [&str; 2] = ["None", "Not specified"];

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Reading status of a book on the user's shelves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Not on any shelf.
    None,
    ToRead,
    Current,
    Read,
    DidNotFinish,
}

impl Status {
    /// Label shown in `.read-status-label`.
    pub fn label(self) -> &'static str {
        match self {
            Self::None => "",
            Self::ToRead => "to read",
            Self::Current => "currently reading",
            Self::Read => "read",
            Self::DidNotFinish => "did not finish",
        }
    }

    /// Status for a `.read-status-label` text.
    pub fn from_label(label: &str) -> Result<Self> {
        let label = label.trim();
        [
            Self::None,
            Self::ToRead,
            Self::Current,
            Self::Read,
            Self::DidNotFinish,
        ]
        .into_iter()
        .find(|s| s.label() == label)
        .ok_or_else(|| StoryGraphError::parse(format!("unknown read status {label:?}")))
    }

    /// Form of the label used in `update-status` actions.
    fn slug(self) -> String {
        self.label().replace(' ', "-")
    }
}

impl FromStr for Status {
    type Err = StoryGraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace(' ', "-").as_str() {
            "none" | "remove" => Ok(Self::None),
            "to-read" | "want" => Ok(Self::ToRead),
            "current" | "currently-reading" | "reading" => Ok(Self::Current),
            "read" | "finished" => Ok(Self::Read),
            "dnf" | "did-not-finish" => Ok(Self::DidNotFinish),
            other => Err(StoryGraphError::parse(format!("unknown status {other:?}"))),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            other => f.write_str(other.label()),
        }
    }
}

// ---------------------------------------------------------------------------
// Info
// ---------------------------------------------------------------------------

/// Title block of a book.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookInfo {
    pub title: String,
    pub author: Option<String>,
    pub series: Option<String>,
    /// Position in the series, as written (`1`, `2.5`).
    pub series_number: Option<String>,
}

/// `Field: value` pairs from an `.edition-info` block, in page order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditionInfo {
    pub fields: Vec<(String, Option<String>)>,
}

impl EditionInfo {
    /// Value of a field; `None` both when absent and when unknown.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .and_then(|(_, value)| value.as_deref())
    }

    fn extract(doc: &Html) -> Result<Option<Self>> {
        let Some(block) = select_first(doc, ".edition-info")? else {
            return Ok(None);
        };

        let mut fields = Vec::new();
        for line in block.select(&selector("p")?) {
            let parts: Vec<String> = line
                .children()
                .filter_map(|node| match ElementRef::wrap(node) {
                    Some(el) => Some(text_of(el)),
                    None => node.value().as_text().map(|t| t.to_string()),
                })
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty())
                .collect();

            let [field, value] = parts.as_slice() else {
                return Err(StoryGraphError::parse(format!(
                    "malformed edition info line: {parts:?}"
                )));
            };

            let value = (!UNKNOWN_VALUES.contains(&value.as_str())).then(|| value.clone());
            fields.push((field.trim_end_matches(':').to_string(), value));
        }

        Ok(Some(Self { fields }))
    }
}

// ---------------------------------------------------------------------------
// Book
// ---------------------------------------------------------------------------

/// View over the markup of one book.
#[derive(Clone)]
pub struct Book {
    session: Session,
    fragment: String,
}

impl FromFragment for Book {
    fn from_fragment(session: Session, fragment: String) -> Self {
        Self { session, fragment }
    }
}

impl Book {
    /// Fetch a book page and wrap its `<main>`.
    pub async fn fetch(session: &Session, path: &str) -> Result<Self> {
        let main = session.fetch_main(path).await?;
        Ok(Self::from_fragment(session.clone(), main))
    }

    /// Markup this view reads from.
    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    fn doc(&self) -> Html {
        Html::parse_fragment(&self.fragment)
    }

    /// `/books/<id>`, from the first link into the book's pages.
    pub fn path(&self) -> Result<String> {
        let doc = self.doc();
        let href = select_first(&doc, r#"a[href^="/books/"]"#)?
            .and_then(|a| a.value().attr("href"))
            .ok_or_else(|| StoryGraphError::parse("no self link"))?;
        Ok(href.split('/').take(3).collect::<Vec<_>>().join("/"))
    }

    /// Site identifier of the book.
    pub fn id(&self) -> Result<String> {
        let path = self.path()?;
        Ok(path.rsplit('/').next().unwrap_or_default().to_string())
    }

    /// Title, author and series from `.book-title-author-and-series`.
    pub fn info(&self) -> Result<BookInfo> {
        let doc = self.doc();
        let root = select_first(&doc, ".book-title-author-and-series")?
            .ok_or_else(|| StoryGraphError::parse("no title block"))?;

        let mut info = BookInfo::default();
        let mut title = None;

        for link in root.select(&selector("a[href]")?) {
            let href = link.value().attr("href").unwrap_or_default();
            let text = text_of(link).trim().to_string();
            match href.split('/').nth(1) {
                Some("books") => title = Some(text),
                Some("authors") => info.author = Some(text),
                Some("series") => {
                    if info.series.is_none() {
                        info.series = Some(text);
                    } else if let Some(number) = text.strip_prefix('#') {
                        info.series_number = Some(number.to_string());
                    }
                }
                _ => {}
            }
        }

        info.title = match title {
            Some(title) => title,
            None => select_first(&doc, ".book-title-author-and-series h3")?
                .and_then(|h3| h3.text().next())
                .map(|t| t.trim().to_string())
                .ok_or_else(|| StoryGraphError::parse("no title"))?,
        };

        Ok(info)
    }

    pub fn title(&self) -> Result<String> {
        Ok(self.info()?.title)
    }

    pub fn author(&self) -> Result<Option<String>> {
        Ok(self.info()?.author)
    }

    /// Page count, from a `<n> pages` text.
    pub fn pages(&self) -> Option<u32> {
        let doc = self.doc();
        doc.root_element()
            .text()
            .find_map(|t| PAGES_RE.captures(t.trim()).and_then(|c| c[1].parse().ok()))
    }

    /// Current shelf of the book.
    pub fn status(&self) -> Result<Status> {
        let doc = self.doc();
        match select_first(&doc, ".read-status-label")? {
            Some(label) => Status::from_label(&text_of(label)),
            None => Ok(Status::None),
        }
    }

    /// Move the book to another shelf (or off all shelves).
    #[instrument(skip_all, fields(status = %new))]
    pub async fn set_status(&mut self, new: Status) -> Result<()> {
        if self.status()? == new {
            return Ok(());
        }

        let form = {
            let doc = self.doc();
            status_form(&doc, new)?
        };
        self.session.submit(&form, Vec::new(), false).await?;
        self.reload().await
    }

    /// Whether the book is marked as owned.
    pub fn owned(&self) -> Result<bool> {
        let doc = self.doc();
        Ok(select_first(&doc, ".remove-from-owned-link")?.is_some())
    }

    /// Mark or unmark the book as owned. No-op if the page offers no such link.
    #[instrument(skip_all, fields(owned = owned))]
    pub async fn set_owned(&mut self, owned: bool) -> Result<()> {
        let class = if owned {
            ".mark-as-owned-link"
        } else {
            ".remove-from-owned-link"
        };

        let link = {
            let doc = self.doc();
            select_first(&doc, class)?
                .map(MethodLink::from_element)
                .transpose()?
        };
        let Some(link) = link else {
            debug!(class, "no ownership link, nothing to do");
            return Ok(());
        };

        self.session.follow(&link).await?;
        self.reload().await
    }

    async fn update_progress(&self, unit: &str, value: u32) -> Result<()> {
        let form = {
            let doc = self.doc();
            Form::find(&doc, r#"form[action="/update-progress"]"#)?
        };
        let overrides = vec![
            ("read_status[progress_number]".to_string(), value.to_string()),
            ("read_status[progress_type]".to_string(), unit.to_string()),
        ];
        self.session.submit(&form, overrides, true).await?;
        Ok(())
    }

    /// Record reading progress in pages.
    pub async fn set_pages_read(&self, pages: u32) -> Result<()> {
        self.update_progress("pages", pages).await
    }

    /// Record reading progress as a percentage.
    pub async fn set_percent_read(&self, percent: u32) -> Result<()> {
        self.update_progress("percentage", percent).await
    }

    /// Edition details, from this markup or else the book's editions page.
    pub async fn metadata(&self) -> Result<EditionInfo> {
        let local = {
            let doc = self.doc();
            EditionInfo::extract(&doc)?
        };
        if let Some(info) = local {
            return Ok(info);
        }

        let main = self
            .session
            .fetch_main(&format!("{}/editions", self.path()?))
            .await?;
        let doc = Html::parse_fragment(&main);
        EditionInfo::extract(&doc)?.ok_or_else(|| StoryGraphError::parse("no edition info"))
    }

    /// Past and current reads of this book.
    pub async fn reads(&self) -> Result<Vec<Read>> {
        let path = format!("/read_instances/new?book_id={}", self.id()?);
        let main = self.session.fetch_main(&path).await?;
        let doc = Html::parse_fragment(&main);

        let panel = select_first(&doc, "#reading-summary")?
            .ok_or_else(|| StoryGraphError::parse("no reading summary"))?;
        let marker = selector(".edit-read-instance")?;

        Ok(child_elements(panel)
            .filter(|row| row.value().name() == "p")
            .filter(|row| row.select(&marker).next().is_some())
            .map(|row| Read::from_fragment(self.session.clone(), row.html()))
            .collect())
    }

    /// Other editions of the same work.
    pub fn other_editions(&self) -> Result<Pager<Book>> {
        let path = format!("{}/editions", self.path()?);
        Ok(self
            .session
            .paged(&path, SEARCH_RESULTS, Vec::new()))
    }

    /// Re-fetch the book page.
    pub async fn reload(&mut self) -> Result<()> {
        let path = self.path()?;
        self.fragment = self.session.fetch_main(&path).await?;
        Ok(())
    }
}

/// Form that moves a book to `status`.
fn status_form(doc: &Html, status: Status) -> Result<Form> {
    let needle = format!("={}", status.slug());
    for form in doc.select(&selector("form[action]")?) {
        let action = form.value().attr("action").unwrap_or_default();
        let matches = match status {
            Status::None => action.contains("/remove-book/"),
            _ => action.contains("/update-status") && action.contains(&needle),
        };
        if matches {
            return Form::from_element(form);
        }
    }
    Err(StoryGraphError::parse("no update status form"))
}

impl fmt::Display for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.info() {
            Ok(info) => match info.author {
                Some(author) => write!(f, "{} by {author}", info.title),
                None => f.write_str(&info.title),
            },
            Err(_) => f.write_str("<unrecognised book>"),
        }
    }
}

impl fmt::Debug for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info = self.info().unwrap_or_default();
        f.debug_struct("Book")
            .field("title", &info.title)
            .field("author", &info.author)
            .finish()
    }
}
