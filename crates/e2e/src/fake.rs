//! In-memory interaction driver
//!
//! [`FakeDriver`] stands in for a browser when exercising flows in tests.
//! The application is modelled as a set of pages keyed by URL path, each a
//! flat list of elements. Clicking an element can navigate, reveal another
//! element, or compute a destination from the values entered so far. Every
//! call made through the driver is appended to a shared [`CallLog`].

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::driver::{ElementHandle, InteractionDriver};
use crate::error::{HarnessError, HarnessResult};
use crate::locator::{Locator, Target};

/// Values entered into the current page, keyed by field name
///
/// A field's key is its `name` attribute when it has one, otherwise its
/// accessible name.
pub type FormValues = HashMap<String, String>;

type RouteFn = dyn Fn(&FormValues) -> Option<String> + Send + Sync;

/// What clicking an element does
#[derive(Clone, Default)]
pub enum ClickAction {
    #[default]
    Nothing,
    /// Go to a URL (relative URLs are joined to the app's base URL)
    Navigate(String),
    /// Make the element with this key visible
    Reveal(String),
    /// Navigate wherever the function says, or stay put on `None`
    Route(Arc<RouteFn>),
}

impl ClickAction {
    pub fn route<F>(f: F) -> Self
    where
        F: Fn(&FormValues) -> Option<String> + Send + Sync + 'static,
    {
        ClickAction::Route(Arc::new(f))
    }
}

impl std::fmt::Debug for ClickAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClickAction::Nothing => write!(f, "Nothing"),
            ClickAction::Navigate(url) => write!(f, "Navigate({})", url),
            ClickAction::Reveal(key) => write!(f, "Reveal({})", key),
            ClickAction::Route(_) => write!(f, "Route(..)"),
        }
    }
}

/// One element on a fake page
#[derive(Debug, Clone)]
pub struct FakeElement {
    /// Stable key used by [`ClickAction::Reveal`]; defaults to the accessible name
    pub key: String,
    pub tag: String,
    pub role: Option<String>,
    /// Accessible name
    pub name: String,
    pub text: String,
    pub attributes: HashMap<String, String>,
    pub options: Vec<String>,
    pub visible: bool,
    pub enabled: bool,
    pub editable: bool,
    pub on_click: ClickAction,
}

impl FakeElement {
    fn new(tag: &str, role: Option<&str>, name: &str) -> Self {
        Self {
            key: name.to_string(),
            tag: tag.to_string(),
            role: role.map(str::to_string),
            name: name.to_string(),
            text: name.to_string(),
            attributes: HashMap::new(),
            options: Vec::new(),
            visible: true,
            enabled: true,
            editable: false,
            on_click: ClickAction::Nothing,
        }
    }

    pub fn textbox(name: &str) -> Self {
        Self {
            editable: true,
            text: String::new(),
            ..Self::new("input", Some("textbox"), name)
        }
    }

    pub fn button(name: &str) -> Self {
        Self::new("button", Some("button"), name)
    }

    pub fn heading(name: &str) -> Self {
        Self::new("h1", Some("heading"), name)
    }

    /// `<select name="...">` with the given option values
    pub fn select(name_attr: &str, options: &[&str]) -> Self {
        let mut element = Self::new("select", Some("combobox"), name_attr);
        element
            .attributes
            .insert("name".to_string(), name_attr.to_string());
        element.options = options.iter().map(|o| o.to_string()).collect();
        element.text = String::new();
        element
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.key = key.to_string();
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.editable = false;
        self
    }

    pub fn on_click(mut self, action: ClickAction) -> Self {
        self.on_click = action;
        self
    }

    fn field_key(&self) -> String {
        self.attributes
            .get("name")
            .cloned()
            .unwrap_or_else(|| self.name.clone())
    }

    fn matches(&self, target: &Target) -> bool {
        match target {
            Target::Role { role, name } => self.role.as_deref() == Some(role.as_str()) && &self.name == name,
            Target::Attribute { element, name } => {
                &self.tag == element && self.attributes.get("name") == Some(name)
            }
            Target::Text { text } => &self.text == text,
        }
    }
}

/// Model of the application under test
#[derive(Debug, Clone)]
pub struct FakeApp {
    base_url: String,
    pages: HashMap<String, Vec<FakeElement>>,
}

impl FakeApp {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            pages: HashMap::new(),
        }
    }

    pub fn page(mut self, path: &str, elements: Vec<FakeElement>) -> Self {
        self.pages.insert(path.to_string(), elements);
        self
    }

    fn absolute(&self, url: &str) -> String {
        if url.starts_with('/') {
            format!("{}{}", self.base_url, url)
        } else {
            url.to_string()
        }
    }

    /// Page path of a URL, query and fragment dropped
    fn path_of<'a>(&self, url: &'a str) -> &'a str {
        let rest = url.strip_prefix(self.base_url.as_str()).unwrap_or(url);
        let end = rest.find(|c: char| c == '?' || c == '#').unwrap_or(rest.len());
        match &rest[..end] {
            "" => "/",
            path => path,
        }
    }
}

/// One recorded driver invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Launch,
    NewPage,
    Goto(String),
    Locate(String),
    Fill { element: String, value: String },
    Select { element: String, value: String },
    Click(String),
    CurrentUrl,
    IsVisible(String),
    Screenshot(PathBuf),
    Close,
}

/// Shared record of driver calls; clones observe the same log
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl CallLog {
    fn push(&self, call: Call) {
        self.calls.lock().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| predicate(c)).count()
    }

    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::Screenshot(path) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::Click(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn closes(&self) -> usize {
        self.count(|c| matches!(c, Call::Close))
    }
}

/// Scripted [`InteractionDriver`] backed by a [`FakeApp`]
#[derive(Debug)]
pub struct FakeDriver {
    app: FakeApp,
    log: CallLog,
    launched: bool,
    page_open: bool,
    current_url: String,
    values: HashMap<String, FormValues>,
    revealed: HashSet<String>,
    fail_screenshots: bool,
    fail_new_page: bool,
}

impl FakeDriver {
    pub fn new(app: FakeApp) -> Self {
        Self {
            app,
            log: CallLog::default(),
            launched: false,
            page_open: false,
            current_url: "about:blank".to_string(),
            values: HashMap::new(),
            revealed: HashSet::new(),
            fail_screenshots: false,
            fail_new_page: false,
        }
    }

    /// Report every screenshot as an I/O failure
    pub fn failing_screenshots(mut self) -> Self {
        self.fail_screenshots = true;
        self
    }

    /// Fail opening the page after the browser launched
    pub fn failing_new_page(mut self) -> Self {
        self.fail_new_page = true;
        self
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    fn ensure_page(&self) -> HarnessResult<()> {
        if self.page_open {
            Ok(())
        } else {
            Err(HarnessError::DriverFault("no page open".to_string()))
        }
    }

    fn current_path(&self) -> String {
        self.app.path_of(&self.current_url).to_string()
    }

    fn element(&self, handle: &ElementHandle) -> HarnessResult<&FakeElement> {
        let stale = || HarnessError::ElementNotFound {
            locator: format!("stale element handle {}", handle.id),
            waited: Duration::ZERO,
        };
        let (path, index) = handle.id.rsplit_once('#').ok_or_else(stale)?;
        if path != self.current_path() {
            return Err(stale());
        }
        let index: usize = index.parse().map_err(|_| stale())?;
        self.app
            .pages
            .get(path)
            .and_then(|elements| elements.get(index))
            .ok_or_else(stale)
    }

    fn visible(&self, element: &FakeElement) -> bool {
        element.visible || self.revealed.contains(&element.key)
    }

    fn shut_down(&mut self) {
        self.log.push(Call::Close);
        self.page_open = false;
        self.launched = false;
    }

    fn navigate(&mut self, url: &str) {
        self.current_url = self.app.absolute(url);
        self.values.entry(self.current_path()).or_default();
    }
}

#[async_trait]
impl InteractionDriver for FakeDriver {
    async fn launch(&mut self) -> HarnessResult<()> {
        self.log.push(Call::Launch);
        self.launched = true;
        Ok(())
    }

    async fn new_page(&mut self) -> HarnessResult<()> {
        self.log.push(Call::NewPage);
        if !self.launched {
            return Err(HarnessError::DriverFault("browser not launched".to_string()));
        }
        if self.fail_new_page {
            return Err(HarnessError::DriverFault("page crashed on open".to_string()));
        }
        self.page_open = true;
        Ok(())
    }

    async fn goto(&mut self, url: &str) -> HarnessResult<()> {
        self.log.push(Call::Goto(url.to_string()));
        self.ensure_page()?;
        self.revealed.clear();
        self.navigate(url);
        Ok(())
    }

    async fn locate(&mut self, locator: &Locator) -> HarnessResult<Vec<ElementHandle>> {
        self.log.push(Call::Locate(locator.to_string()));
        self.ensure_page()?;

        let path = self.current_path();
        let Some(elements) = self.app.pages.get(&path) else {
            return Ok(Vec::new());
        };

        Ok(elements
            .iter()
            .enumerate()
            .filter(|(_, e)| e.matches(&locator.target))
            .map(|(i, e)| ElementHandle::new(format!("{}#{}", path, i), e.name.clone()))
            .collect())
    }

    async fn fill(&mut self, handle: &ElementHandle, text: &str) -> HarnessResult<()> {
        self.log.push(Call::Fill {
            element: handle.id.clone(),
            value: text.to_string(),
        });
        let element = self.element(handle)?;
        if !element.editable || !element.enabled {
            return Err(HarnessError::InteractionError {
                locator: handle.to_string(),
                reason: "element is not editable".to_string(),
            });
        }
        let key = element.field_key();
        let path = self.current_path();
        self.values
            .entry(path)
            .or_default()
            .insert(key, text.to_string());
        Ok(())
    }

    async fn select_option(&mut self, handle: &ElementHandle, value: &str) -> HarnessResult<()> {
        self.log.push(Call::Select {
            element: handle.id.clone(),
            value: value.to_string(),
        });
        let element = self.element(handle)?;
        if !element.options.iter().any(|o| o == value) {
            return Err(HarnessError::InteractionError {
                locator: handle.to_string(),
                reason: format!("no option with value \"{}\"", value),
            });
        }
        let key = element.field_key();
        let path = self.current_path();
        self.values
            .entry(path)
            .or_default()
            .insert(key, value.to_string());
        Ok(())
    }

    async fn click(&mut self, handle: &ElementHandle) -> HarnessResult<()> {
        self.log.push(Call::Click(handle.id.clone()));
        let element = self.element(handle)?;
        if !self.visible(element) || !element.enabled {
            return Err(HarnessError::InteractionError {
                locator: handle.to_string(),
                reason: "element is not visible and enabled".to_string(),
            });
        }

        match element.on_click.clone() {
            ClickAction::Nothing => {}
            ClickAction::Navigate(url) => self.navigate(&url),
            ClickAction::Reveal(key) => {
                self.revealed.insert(key);
            }
            ClickAction::Route(route) => {
                let form = self
                    .values
                    .get(&self.current_path())
                    .cloned()
                    .unwrap_or_default();
                if let Some(url) = route(&form) {
                    self.navigate(&url);
                }
            }
        }
        Ok(())
    }

    async fn current_url(&mut self) -> HarnessResult<String> {
        self.log.push(Call::CurrentUrl);
        self.ensure_page()?;
        Ok(self.current_url.clone())
    }

    async fn is_visible(&mut self, handle: &ElementHandle) -> HarnessResult<bool> {
        self.log.push(Call::IsVisible(handle.id.clone()));
        let element = self.element(handle)?;
        Ok(self.visible(element))
    }

    async fn screenshot(&mut self, path: &Path) -> HarnessResult<()> {
        self.log.push(Call::Screenshot(path.to_path_buf()));
        self.ensure_page()?;
        if self.fail_screenshots {
            return Err(HarnessError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "screenshot target not writable",
            )));
        }
        std::fs::write(path, format!("fake screenshot of {}", self.current_url))?;
        Ok(())
    }

    async fn close(&mut self) -> HarnessResult<()> {
        self.shut_down();
        Ok(())
    }

    fn abort(&mut self) {
        self.shut_down();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> FakeApp {
        FakeApp::new("http://localhost:3000").page(
            "/employee/dashboard",
            vec![
                FakeElement::heading("Employee Dashboard"),
                FakeElement::button("Reschedule")
                    .with_key("reschedule-1")
                    .on_click(ClickAction::Navigate(
                        "/employee/appointments?reschedule=1".to_string(),
                    )),
                FakeElement::button("Reschedule")
                    .with_key("reschedule-2")
                    .on_click(ClickAction::Navigate(
                        "/employee/appointments?reschedule=2".to_string(),
                    )),
            ],
        )
    }

    async fn opened(app: FakeApp) -> FakeDriver {
        let mut driver = FakeDriver::new(app);
        driver.launch().await.unwrap();
        driver.new_page().await.unwrap();
        driver
    }

    #[tokio::test]
    async fn test_locate_returns_matches_in_declared_order() {
        let mut driver = opened(app()).await;
        driver.goto("/employee/dashboard").await.unwrap();

        let found = driver.locate(&Locator::button("Reschedule")).await.unwrap();
        let ids: Vec<_> = found.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["/employee/dashboard#1", "/employee/dashboard#2"]);
    }

    #[tokio::test]
    async fn test_query_string_does_not_change_page() {
        let mut driver = opened(app()).await;
        driver
            .goto("http://localhost:3000/employee/dashboard?tab=upcoming")
            .await
            .unwrap();
        let found = driver
            .locate(&Locator::heading("Employee Dashboard"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_handles_go_stale_after_navigation() {
        let mut driver = opened(app()).await;
        driver.goto("/employee/dashboard").await.unwrap();
        let found = driver.locate(&Locator::button("Reschedule")).await.unwrap();

        driver.click(&found[1]).await.unwrap();
        assert_eq!(
            driver.current_url().await.unwrap(),
            "http://localhost:3000/employee/appointments?reschedule=2"
        );
        assert!(matches!(
            driver.click(&found[0]).await,
            Err(HarnessError::ElementNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_route_sees_entered_values() {
        let app = FakeApp::new("http://localhost:3000").page(
            "/login",
            vec![
                FakeElement::select("role", &["admin", "employee"]),
                FakeElement::button("Sign In").on_click(ClickAction::route(|form| {
                    form.get("role").map(|role| format!("/{}/dashboard", role))
                })),
            ],
        );
        let mut driver = opened(app).await;
        driver.goto("/login").await.unwrap();

        let select = driver
            .locate(&Locator::attribute("select", "role"))
            .await
            .unwrap();
        driver.select_option(&select[0], "admin").await.unwrap();
        assert!(matches!(
            driver.select_option(&select[0], "manager").await,
            Err(HarnessError::InteractionError { .. })
        ));

        let button = driver.locate(&Locator::button("Sign In")).await.unwrap();
        driver.click(&button[0]).await.unwrap();
        assert_eq!(
            driver.current_url().await.unwrap(),
            "http://localhost:3000/admin/dashboard"
        );
    }
}
