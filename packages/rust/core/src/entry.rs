//! Reading journal entries.

use std::fmt;

use scraper::{ElementRef, Html};
use tracing::{debug, instrument};

use storygraph_session::markup::{child_elements, fragment_root, select_first, selector, text_of};
use storygraph_session::{Fields, Form, FromFragment, MethodLink, Session};
use storygraph_shared::{Result, StoryGraphError};

use crate::book::Book;
use crate::dates::ApproxDate;

/// Kind of progress an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Progress {
    Started,
    Updated,
    Finished,
}

/// Changes to apply to an entry. Unset fields keep the page's values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryEdit {
    pub when: Option<ApproxDate>,
    pub percent: Option<u32>,
    pub pages: Option<u32>,
    pub pages_total: Option<u32>,
}

/// One journal entry card.
///
/// The card's second child holds three columns: date, title and progress.
/// Page counts live only on the entry's edit page, which is fetched on first
/// use and kept until [`reload`](Entry::reload).
#[derive(Clone)]
pub struct Entry {
    session: Session,
    fragment: String,
    edit_page: Option<String>,
}

impl FromFragment for Entry {
    fn from_fragment(session: Session, fragment: String) -> Self {
        Self {
            session,
            fragment,
            edit_page: None,
        }
    }
}

/// Date, title and progress columns of a card.
fn columns(doc: &Html) -> Result<[ElementRef<'_>; 3]> {
    let body = fragment_root(doc)
        .and_then(|card| child_elements(card).nth(1))
        .ok_or_else(|| StoryGraphError::parse("journal entry has no body"))?;

    let mut cols = child_elements(body);
    match (cols.next(), cols.next(), cols.next()) {
        (Some(date), Some(title), Some(progress)) => Ok([date, title, progress]),
        _ => Err(StoryGraphError::parse("journal entry has fewer than three columns")),
    }
}

impl Entry {
    fn doc(&self) -> Html {
        Html::parse_fragment(&self.fragment)
    }

    /// Date of the entry; `None` when the site shows `No date`.
    pub fn when(&self) -> Result<Option<ApproxDate>> {
        let doc = self.doc();
        let [date, _, _] = columns(&doc)?;
        date.text()
            .find_map(|t| ApproxDate::parse(t).ok())
            .ok_or_else(|| StoryGraphError::parse("no entry date"))
    }

    fn title_link(&self) -> Result<(String, String)> {
        let doc = self.doc();
        let [_, title, _] = columns(&doc)?;
        let link = title
            .select(&selector("a")?)
            .next()
            .ok_or_else(|| StoryGraphError::parse("no entry title link"))?;
        let href = link.value().attr("href").unwrap_or_default().to_string();
        Ok((text_of(link).trim().to_string(), href))
    }

    pub fn title(&self) -> Result<String> {
        Ok(self.title_link()?.0)
    }

    /// Author, from the cover's `<title> by <author>` alt text.
    pub fn author(&self) -> Result<String> {
        let title = self.title()?;
        let doc = self.doc();
        let alt = select_first(&doc, "img")?
            .and_then(|img| img.value().attr("alt"))
            .unwrap_or_default();
        alt.strip_prefix(&format!("{title} by "))
            .map(str::to_string)
            .ok_or_else(|| StoryGraphError::parse("can't derive author"))
    }

    /// Kind of progress and the percentage reached.
    pub fn progress(&self) -> Result<(Progress, u32)> {
        let doc = self.doc();
        let [_, _, progress] = columns(&doc)?;
        for text in progress.text() {
            let text = text.trim();
            if text.contains("Started") {
                return Ok((Progress::Started, 0));
            }
            if text.contains("Finished") {
                return Ok((Progress::Finished, 100));
            }
            if let Some(Ok(percent)) = text.strip_suffix('%').map(str::parse::<u32>) {
                return Ok((Progress::Updated, percent));
            }
        }
        Err(StoryGraphError::parse("no entry progress"))
    }

    fn edit_link(&self) -> Result<String> {
        let doc = self.doc();
        let [date, _, _] = columns(&doc)?;
        date.select(&selector("a[href]")?)
            .filter_map(|a| a.value().attr("href"))
            .find(|href| href.starts_with("/journal_entries/"))
            .map(str::to_string)
            .ok_or_else(|| StoryGraphError::parse("no entry edit page"))
    }

    async fn edit_page(&mut self) -> Result<String> {
        if let Some(page) = &self.edit_page {
            return Ok(page.clone());
        }
        let page = self.session.fetch_main(&self.edit_link()?).await?;
        self.edit_page = Some(page.clone());
        Ok(page)
    }

    async fn edit_input(&mut self, name: &str) -> Result<u32> {
        let page = self.edit_page().await?;
        let doc = Html::parse_fragment(&page);
        let value = select_first(&doc, &format!(r#"input[name="{name}"]"#))?
            .and_then(|input| input.value().attr("value"))
            .ok_or_else(|| StoryGraphError::parse(format!("no {name} value")))?;
        value
            .trim()
            .parse()
            .map_err(|_| StoryGraphError::parse(format!("{name} is not a number: {value:?}")))
    }

    pub async fn pages(&mut self) -> Result<u32> {
        self.edit_input("journal_entry[pages_read]").await
    }

    pub async fn pages_total(&mut self) -> Result<u32> {
        self.edit_input("journal_entry[pages_read_total]").await
    }

    pub async fn percent(&mut self) -> Result<u32> {
        self.edit_input("journal_entry[percent_reached]").await
    }

    /// Submit the entry's edit form with `changes` applied.
    #[instrument(skip_all)]
    pub async fn edit(&mut self, changes: EntryEdit) -> Result<()> {
        let page = self.edit_page().await?;
        let form = {
            let doc = Html::parse_fragment(&page);
            Form::find(&doc, "form.edit_journal_entry")?
        };

        let mut overrides = Fields::new();
        if let Some(when) = changes.when {
            overrides.extend(when.form_fields("journal_entry[{}]"));
        }
        let numbers = [
            ("journal_entry[pages_read]", changes.pages),
            ("journal_entry[pages_read_total]", changes.pages_total),
            ("journal_entry[percent_reached]", changes.percent),
        ];
        for (name, value) in numbers {
            if let Some(value) = value {
                overrides.push((name.to_string(), value.to_string()));
            }
        }

        debug!(fields = overrides.len(), "editing journal entry");
        self.session.submit(&form, overrides, false).await?;
        self.reload();
        Ok(())
    }

    pub async fn set_when(&mut self, when: ApproxDate) -> Result<()> {
        self.edit(EntryEdit {
            when: Some(when),
            ..EntryEdit::default()
        })
        .await
    }

    pub async fn set_pages(&mut self, pages: u32) -> Result<()> {
        self.edit(EntryEdit {
            pages: Some(pages),
            ..EntryEdit::default()
        })
        .await
    }

    pub async fn set_pages_total(&mut self, pages_total: u32) -> Result<()> {
        self.edit(EntryEdit {
            pages_total: Some(pages_total),
            ..EntryEdit::default()
        })
        .await
    }

    pub async fn set_percent(&mut self, percent: u32) -> Result<()> {
        self.edit(EntryEdit {
            percent: Some(percent),
            ..EntryEdit::default()
        })
        .await
    }

    /// Delete the entry through its edit page's delete link.
    pub async fn delete(&mut self) -> Result<()> {
        let page = self.edit_page().await?;
        let link = {
            let doc = Html::parse_fragment(&page);
            let found = doc
                .select(&selector(r#"a[data-method="delete"]"#)?)
                .find(|a| {
                    a.value()
                        .attr("href")
                        .is_some_and(|href| href.starts_with("/journal_entries/"))
                });
            found
                .map(MethodLink::from_element)
                .transpose()?
                .ok_or_else(|| StoryGraphError::parse("no delete link"))?
        };
        self.session.follow(&link).await?;
        Ok(())
    }

    /// The book this entry is about.
    pub async fn book(&self) -> Result<Book> {
        let (_, href) = self.title_link()?;
        Book::fetch(&self.session, &href).await
    }

    /// Forget the cached edit page.
    pub fn reload(&mut self) {
        self.edit_page = None;
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = self.title().unwrap_or_else(|_| "<untitled>".to_string());
        match self.progress() {
            Ok((progress, percent)) => write!(f, "{title} {progress:?} {percent}%"),
            Err(_) => f.write_str(&title),
        }
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entry({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use storygraph_session::Listing;
    use storygraph_shared::SessionConfig;
    use url::Url;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::dates::DateAccuracy;

    fn fixture(name: &str) -> String {
        let path = format!("../../../fixtures/html/{name}");
        std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }

    fn session_for(server: &MockServer) -> Session {
        let config = SessionConfig::for_base_url(Url::parse(&server.uri()).unwrap());
        Session::new(&config).unwrap()
    }

    fn entries(session: &Session) -> Vec<Entry> {
        let doc = Html::parse_document(&fixture("journal.html"));
        Listing::extract(&doc, "journal-entry-panes")
            .unwrap()
            .items
            .into_iter()
            .map(|f| Entry::from_fragment(session.clone(), f))
            .collect()
    }

    async fn mount_edit_page(server: &MockServer, times: u64) {
        Mock::given(method("GET"))
            .and(path("/journal_entries/42/edit"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(fixture("journal_edit.html")),
            )
            .expect(times)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn card_fields() {
        let server = MockServer::start().await;
        let entries = entries(&session_for(&server));
        assert_eq!(entries.len(), 3);

        let first = &entries[0];
        assert_eq!(first.title().unwrap(), "Piranesi");
        assert_eq!(first.author().unwrap(), "Susanna Clarke");
        assert_eq!(first.progress().unwrap(), (Progress::Updated, 45));
        assert_eq!(
            first.when().unwrap(),
            Some(ApproxDate::day(NaiveDate::from_ymd_opt(2024, 1, 12).unwrap()))
        );
        assert_eq!(first.to_string(), "Piranesi Updated 45%");

        assert_eq!(entries[1].progress().unwrap(), (Progress::Started, 0));
        assert_eq!(entries[1].when().unwrap().unwrap().accuracy, DateAccuracy::Month);

        assert_eq!(entries[2].progress().unwrap(), (Progress::Finished, 100));
        assert_eq!(entries[2].when().unwrap(), None);
        assert!(entries[2].author().is_err());
    }

    #[test]
    fn card_without_columns_is_parse_error() {
        let config = SessionConfig::for_base_url(Url::parse("http://127.0.0.1:9/").unwrap());
        let session = Session::new(&config).unwrap();
        let entry = Entry::from_fragment(session, "<div><div></div></div>".to_string());
        assert!(matches!(entry.when(), Err(StoryGraphError::Parse { .. })));
        assert!(matches!(entry.progress(), Err(StoryGraphError::Parse { .. })));
    }

    #[tokio::test]
    async fn edit_page_is_cached() {
        let server = MockServer::start().await;
        mount_edit_page(&server, 1).await;

        let mut entry = entries(&session_for(&server)).remove(0);
        assert_eq!(entry.pages().await.unwrap(), 120);
        assert_eq!(entry.pages_total().await.unwrap(), 272);
        assert_eq!(entry.percent().await.unwrap(), 45);
    }

    #[tokio::test]
    async fn edit_submits_form_and_drops_cache() {
        let server = MockServer::start().await;
        mount_edit_page(&server, 2).await;

        Mock::given(method("POST"))
            .and(path("/journal_entries/42"))
            .and(body_string_contains("journal_entry%5Byear%5D=2024"))
            .and(body_string_contains("journal_entry%5Bmonth%5D=2"))
            .and(body_string_contains("journal_entry%5Bday%5D=&"))
            .and(body_string_contains("journal_entry%5Bpages_read%5D=150"))
            .and(body_string_contains("journal_entry%5Bpercent_reached%5D=45"))
            .and(body_string_contains("_method=patch"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut entry = entries(&session_for(&server)).remove(0);
        entry
            .edit(EntryEdit {
                when: Some(ApproxDate::new(
                    NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
                    DateAccuracy::Month,
                )),
                pages: Some(150),
                ..EntryEdit::default()
            })
            .await
            .unwrap();

        // Cache dropped: this refetches the edit page.
        entry.pages().await.unwrap();
    }

    #[tokio::test]
    async fn delete_follows_edit_page_link() {
        let server = MockServer::start().await;
        mount_edit_page(&server, 1).await;

        Mock::given(method("POST"))
            .and(path("/journal_entries/42"))
            .and(body_string_contains("_method=delete"))
            .and(body_string_contains("authenticity_token=journal-edit-token"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut entry = entries(&session_for(&server)).remove(0);
        entry.delete().await.unwrap();
    }

    #[tokio::test]
    async fn book_fetches_title_link() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/books/b1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(fixture("book.html")))
            .expect(1)
            .mount(&server)
            .await;

        let entry = entries(&session_for(&server)).remove(0);
        let book = entry.book().await.unwrap();
        assert_eq!(book.title().unwrap(), "The Fellowship of the Ring");
    }
}
