//! Playwright browser automation
//!
//! [`PlaywrightDriver`] runs a small Node.js bridge that owns one browser,
//! one context and one page. Requests and responses are newline-delimited
//! JSON on the bridge's stdin/stdout:
//!
//! ```text
//! -> {"id":3,"cmd":"locate","args":{"target":{...}}}
//! <- {"id":3,"ok":true,"result":[{"id":"el-1","description":"button"}]}
//! <- {"id":4,"ok":false,"kind":"interaction","message":"element is disabled"}
//! ```

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tracing::{debug, info, warn};

use crate::driver::{ElementHandle, InteractionDriver};
use crate::error::{HarnessError, HarnessResult};
use crate::locator::{Locator, Target};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for Browser {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chromium" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" => Ok(Browser::Webkit),
            other => Err(format!("unknown browser: {}", other)),
        }
    }
}

/// Configuration for the Playwright bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub browser: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Node.js executable used to run the bridge
    pub node_binary: PathBuf,

    /// Upper bound for one bridge request; navigation included
    pub request_timeout_ms: u64,

    /// Playwright actionability timeout for fill/select/click
    pub action_timeout_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            node_binary: PathBuf::from("node"),
            request_timeout_ms: 30_000,
            action_timeout_ms: 2_000,
        }
    }
}

/// Bridge script run under node. Element handles live in `handles` until
/// the next navigation or close.
const BRIDGE_JS: &str = r#"
const readline = require('readline');
// resolve playwright relative to the working directory
const { createRequire } = require('module');
const playwright = createRequire(process.cwd() + '/')('playwright');

let browser = null;
let context = null;
let page = null;
let handles = new Map();
let nextHandle = 0;

function fail(kind, message) {
  const err = new Error(message);
  err.kind = kind;
  return err;
}

function locatorFor(target, selector) {
  if (!page) throw fail('fault', 'no page open');
  switch (target.by) {
    case 'role':
      return page.getByRole(target.role, { name: target.name, exact: true });
    case 'attribute':
      return page.locator(selector);
    case 'text':
      return page.getByText(target.text, { exact: true });
    default:
      throw fail('fault', `unknown locator kind: ${target.by}`);
  }
}

function handle(id) {
  const el = handles.get(id);
  if (!el) throw fail('not_found', `stale element handle ${id}`);
  return el;
}

async function dispatch(cmd, args) {
  switch (cmd) {
    case 'launch':
      browser = await playwright[args.browser].launch({ headless: args.headless });
      return null;
    case 'new_page':
      context = await browser.newContext({ viewport: { width: args.width, height: args.height } });
      page = await context.newPage();
      return null;
    case 'goto':
      handles.clear();
      await page.goto(args.url, { waitUntil: 'load' });
      return null;
    case 'locate': {
      const found = await locatorFor(args.target, args.selector).elementHandles();
      return found.map((el) => {
        const id = `el-${nextHandle++}`;
        handles.set(id, el);
        return { id, description: args.description };
      });
    }
    case 'fill':
      if (!(await handle(args.id).isEditable())) throw fail('interaction', 'element is not editable');
      await handle(args.id).fill(args.text, { timeout: args.timeout });
      return null;
    case 'select_option': {
      const el = handle(args.id);
      const values = await el.evaluate((node) => Array.from(node.options || [], (o) => o.value));
      if (!values.includes(args.value)) throw fail('interaction', `no option with value "${args.value}"`);
      await el.selectOption({ value: args.value }, { timeout: args.timeout });
      return null;
    }
    case 'click': {
      const el = handle(args.id);
      if (!(await el.isEnabled())) throw fail('interaction', 'element is disabled');
      await el.click({ timeout: args.timeout });
      return null;
    }
    case 'current_url':
      return page.url();
    case 'is_visible':
      return await handle(args.id).isVisible();
    case 'screenshot':
      await page.screenshot({ path: args.path, fullPage: true });
      return null;
    case 'close':
      if (browser) await browser.close();
      browser = null;
      return null;
    default:
      throw fail('fault', `unknown command: ${cmd}`);
  }
}

const rl = readline.createInterface({ input: process.stdin });
rl.on('line', async (line) => {
  let req;
  try {
    req = JSON.parse(line);
  } catch (e) {
    return;
  }
  try {
    const result = await dispatch(req.cmd, req.args || {});
    process.stdout.write(JSON.stringify({ id: req.id, ok: true, result }) + '\n');
  } catch (error) {
    let kind = error.kind || 'fault';
    if (!error.kind && error.name === 'TimeoutError') kind = 'interaction';
    process.stdout.write(JSON.stringify({ id: req.id, ok: false, kind, message: error.message }) + '\n');
  }
});
rl.on('close', async () => {
  if (browser) await browser.close();
  process.exit(0);
});
"#;

#[derive(Debug, Serialize)]
struct BridgeRequest<'a> {
    id: u64,
    cmd: &'a str,
    args: Value,
}

#[derive(Debug, Deserialize)]
struct BridgeResponse {
    id: u64,
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Running bridge process
struct Bridge {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,

    /// Keeps the bridge script on disk for the process lifetime
    _script_dir: tempfile::TempDir,
}

/// Playwright-backed [`InteractionDriver`]
pub struct PlaywrightDriver {
    config: BrowserConfig,
    bridge: Option<Bridge>,
    next_id: u64,
}

impl PlaywrightDriver {
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            bridge: None,
            next_id: 0,
        }
    }

    /// Check if Playwright is installed
    pub fn check_playwright_installed() -> HarnessResult<()> {
        let output = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(HarnessError::PlaywrightNotFound),
        }
    }

    async fn spawn_bridge(&self) -> HarnessResult<Bridge> {
        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("bridge.js");
        std::fs::write(&script_path, BRIDGE_JS)?;

        debug!("Starting Playwright bridge: {}", script_path.display());

        let mut child = TokioCommand::new(&self.config.node_binary)
            .arg(&script_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                HarnessError::DriverFault(format!(
                    "failed to spawn {}: {}",
                    self.config.node_binary.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| HarnessError::DriverFault("bridge stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HarnessError::DriverFault("bridge stdout unavailable".to_string()))?;

        Ok(Bridge {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            _script_dir: script_dir,
        })
    }

    async fn request(&mut self, cmd: &str, args: Value) -> HarnessResult<Value> {
        let timeout = Duration::from_millis(self.config.request_timeout_ms);
        self.next_id += 1;
        let id = self.next_id;

        let bridge = self
            .bridge
            .as_mut()
            .ok_or_else(|| HarnessError::DriverFault("browser not launched".to_string()))?;

        let mut line = serde_json::to_string(&BridgeRequest { id, cmd, args })?;
        line.push('\n');

        let response = tokio::time::timeout(timeout, exchange(bridge, &line, id))
            .await
            .map_err(|_| {
                HarnessError::DriverFault(format!(
                    "bridge request '{}' timed out after {:?}",
                    cmd, timeout
                ))
            })??;

        if response.ok {
            Ok(response.result)
        } else {
            Err(bridge_error(
                response.kind.as_deref().unwrap_or("fault"),
                response.message.unwrap_or_default(),
            ))
        }
    }

    fn element_args(&self, element: &ElementHandle) -> Value {
        json!({ "id": element.id, "timeout": self.config.action_timeout_ms })
    }

    async fn element_request(
        &mut self,
        cmd: &str,
        element: &ElementHandle,
        extra: Option<(&str, &str)>,
    ) -> HarnessResult<()> {
        let mut args = self.element_args(element);
        if let (Some((key, value)), Some(map)) = (extra, args.as_object_mut()) {
            map.insert(key.to_string(), Value::String(value.to_string()));
        }

        self.request(cmd, args).await.map(|_| ()).map_err(|e| match e {
            HarnessError::InteractionError { reason, .. } => HarnessError::InteractionError {
                locator: element.to_string(),
                reason,
            },
            HarnessError::ElementNotFound { waited, .. } => HarnessError::ElementNotFound {
                locator: element.to_string(),
                waited,
            },
            other => other,
        })
    }

    /// Terminate the bridge process, gracefully first
    async fn stop_bridge(bridge: &mut Bridge) {
        if let Ok(Some(_)) = bridge.child.try_wait() {
            return;
        }
        terminate(&mut bridge.child).await;
    }

    /// Tear the bridge down without awaiting anything.
    ///
    /// Closing stdin makes the bridge close its browser and exit; a task on
    /// the current runtime escalates to SIGTERM and kill if it lingers.
    /// Outside a runtime the process is killed outright.
    fn abort_bridge(bridge: Bridge) {
        let Bridge {
            mut child,
            stdin,
            stdout,
            _script_dir: script_dir,
        } = bridge;
        drop(stdin);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let _keep = (stdout, script_dir);
                    if tokio::time::timeout(Duration::from_secs(2), child.wait())
                        .await
                        .is_err()
                    {
                        terminate(&mut child).await;
                    }
                });
            }
            Err(_) => {
                let _ = child.start_kill();
            }
        }
    }
}

impl Drop for PlaywrightDriver {
    fn drop(&mut self) {
        if let Some(bridge) = self.bridge.take() {
            warn!("Playwright driver dropped with a live bridge, aborting");
            Self::abort_bridge(bridge);
        }
    }
}

/// SIGTERM, then kill if the process is still there after 500ms
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok()
            && tokio::time::timeout(Duration::from_millis(500), child.wait())
                .await
                .is_ok()
        {
            return;
        }
    }

    let _ = child.kill().await;
}

/// CSS selector for an element with an exact `name` attribute
fn attribute_selector(element: &str, name: &str) -> String {
    let mut quoted = String::with_capacity(name.len() + 2);
    for c in name.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '\n' => quoted.push_str("\\a "),
            other => quoted.push(other),
        }
    }
    format!("{}[name=\"{}\"]", element, quoted)
}

/// Send one request line and wait for the response carrying the same id
async fn exchange(bridge: &mut Bridge, line: &str, id: u64) -> HarnessResult<BridgeResponse> {
    bridge.stdin.write_all(line.as_bytes()).await?;
    bridge.stdin.flush().await?;

    loop {
        let Some(reply) = bridge.stdout.next_line().await? else {
            return Err(HarnessError::DriverFault(
                "bridge exited unexpectedly".to_string(),
            ));
        };
        let response: BridgeResponse = match serde_json::from_str(&reply) {
            Ok(response) => response,
            Err(_) => {
                // Playwright or page console output on stdout
                debug!("bridge: {}", reply);
                continue;
            }
        };
        if response.id == id {
            return Ok(response);
        }
        warn!("Discarding stale bridge response {}", response.id);
    }
}

fn bridge_error(kind: &str, message: String) -> HarnessError {
    match kind {
        "not_found" => HarnessError::ElementNotFound {
            locator: message,
            waited: Duration::ZERO,
        },
        "interaction" => HarnessError::InteractionError {
            locator: String::new(),
            reason: message,
        },
        _ => HarnessError::DriverFault(message),
    }
}

#[async_trait]
impl InteractionDriver for PlaywrightDriver {
    async fn launch(&mut self) -> HarnessResult<()> {
        Self::check_playwright_installed()?;
        if self.bridge.is_none() {
            self.bridge = Some(self.spawn_bridge().await?);
        }

        info!(
            "Launching {} (headless: {})",
            self.config.browser.as_str(),
            self.config.headless
        );
        self.request(
            "launch",
            json!({ "browser": self.config.browser.as_str(), "headless": self.config.headless }),
        )
        .await?;
        Ok(())
    }

    async fn new_page(&mut self) -> HarnessResult<()> {
        self.request(
            "new_page",
            json!({ "width": self.config.viewport_width, "height": self.config.viewport_height }),
        )
        .await?;
        Ok(())
    }

    async fn goto(&mut self, url: &str) -> HarnessResult<()> {
        self.request("goto", json!({ "url": url })).await?;
        Ok(())
    }

    async fn locate(&mut self, locator: &Locator) -> HarnessResult<Vec<ElementHandle>> {
        let selector = match &locator.target {
            Target::Attribute { element, name } => Some(attribute_selector(element, name)),
            _ => None,
        };
        let result = self
            .request(
                "locate",
                json!({
                    "target": locator.target,
                    "selector": selector,
                    "description": locator.to_string(),
                }),
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn fill(&mut self, element: &ElementHandle, text: &str) -> HarnessResult<()> {
        self.element_request("fill", element, Some(("text", text)))
            .await
    }

    async fn select_option(&mut self, element: &ElementHandle, value: &str) -> HarnessResult<()> {
        self.element_request("select_option", element, Some(("value", value)))
            .await
    }

    async fn click(&mut self, element: &ElementHandle) -> HarnessResult<()> {
        self.element_request("click", element, None).await
    }

    async fn current_url(&mut self) -> HarnessResult<String> {
        match self.request("current_url", json!({})).await? {
            Value::String(url) => Ok(url),
            other => Err(HarnessError::DriverFault(format!(
                "unexpected current_url result: {}",
                other
            ))),
        }
    }

    async fn is_visible(&mut self, element: &ElementHandle) -> HarnessResult<bool> {
        let result = self
            .request("is_visible", json!({ "id": element.id }))
            .await?;
        Ok(result.as_bool().unwrap_or(false))
    }

    async fn screenshot(&mut self, path: &Path) -> HarnessResult<()> {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        self.request("screenshot", json!({ "path": path })).await?;
        Ok(())
    }

    async fn close(&mut self) -> HarnessResult<()> {
        if self.bridge.is_none() {
            return Ok(());
        }

        let result = self.request("close", json!({})).await.map(|_| ());
        if let Some(mut bridge) = self.bridge.take() {
            Self::stop_bridge(&mut bridge).await;
            debug!("Playwright bridge stopped");
        }
        result
    }

    fn abort(&mut self) {
        if let Some(bridge) = self.bridge.take() {
            Self::abort_bridge(bridge);
        }
    }
}
