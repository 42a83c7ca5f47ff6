//! Built-in scenarios for the appointment portal
//!
//! All three start from the shared login form: email and password
//! textboxes, a `role` select and a "Sign In" button that lands on
//! `/{role}/dashboard`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::HarnessConfig;
use crate::locator::Locator;
use crate::spec::{Role, Scenario, Step, UrlPattern};

/// Dashboards can take a while to render after sign-in
const DASHBOARD_TIMEOUT: Duration = Duration::from_secs(10);

/// Login credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub email: String,
    pub password: String,
}

impl Account {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Accounts the built-in scenarios sign in with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Accounts {
    pub admin: Account,

    /// Used by `employee-login`
    pub employee: Account,

    /// Employee with appointments on file, used by `employee-reschedule`
    pub reschedule: Account,
}

impl Default for Accounts {
    fn default() -> Self {
        Self {
            admin: Account::new("admin@example.com", "password123"),
            employee: Account::new("test@nhs.uk", "password123"),
            reschedule: Account::new("employee@example.com", "password123"),
        }
    }
}

/// Sign in through the login form and wait for the role's dashboard
pub fn login_steps(
    base_url: &str,
    account: &Account,
    role: Role,
    url_timeout: Option<Duration>,
) -> Vec<Step> {
    let dashboard = UrlPattern::Regex(
        regex::Regex::new(&format!("/{}/dashboard", role)).expect("role names are plain words"),
    );

    vec![
        Step::navigate(format!("{}/login", base_url.trim_end_matches('/'))),
        Step::fill(Locator::textbox("NHS Email"), &account.email),
        Step::fill(Locator::textbox("Password"), &account.password),
        Step::select(Locator::attribute("select", "role"), role.as_str()),
        Step::click(Locator::button("Sign In")),
        Step::assert_url(dashboard, url_timeout),
    ]
}

/// Employee signs in and sees their dashboard
pub fn employee_login(base_url: &str, account: &Account) -> Scenario {
    let mut steps = login_steps(base_url, account, Role::Employee, None);
    steps.push(Step::assert_visible(
        Locator::heading("Employee Dashboard"),
        None,
    ));

    Scenario::new("employee-login", steps)
        .with_description("Employee signs in and lands on the employee dashboard")
        .with_tags(&["employee", "login"])
        .expecting(UrlPattern::exact(format!(
            "{}/employee/dashboard",
            base_url.trim_end_matches('/')
        )))
}

/// Admin signs in and opens user management
pub fn admin_navigation(base_url: &str, account: &Account) -> Scenario {
    let mut steps = login_steps(base_url, account, Role::Admin, Some(DASHBOARD_TIMEOUT));
    steps.extend([
        Step::assert_visible(Locator::button("User Management"), None),
        Step::click(Locator::button("User Management")),
        Step::assert_url(users_page(), None),
    ]);

    Scenario::new("admin-navigation", steps)
        .with_description("Admin signs in and navigates to user management")
        .with_tags(&["admin", "navigation"])
}

/// Employee opens the reschedule wizard for their first appointment
pub fn employee_reschedule(base_url: &str, account: &Account) -> Scenario {
    let reschedule = Locator::button("Reschedule").first();

    let mut steps = login_steps(base_url, account, Role::Employee, Some(DASHBOARD_TIMEOUT));
    steps.extend([
        Step::assert_visible(reschedule.clone(), None),
        Step::click(reschedule),
        Step::assert_url(reschedule_page(), None),
        Step::assert_visible(Locator::heading("Date & Time"), None),
    ]);

    Scenario::new("employee-reschedule", steps)
        .with_description("Employee starts rescheduling an appointment")
        .with_tags(&["employee", "appointments"])
}

/// Every built-in scenario, targeting the configured application
pub fn builtin(config: &HarnessConfig) -> Vec<Scenario> {
    let base_url = &config.target.base_url;
    let accounts = &config.accounts;

    vec![
        admin_navigation(base_url, &accounts.admin),
        employee_login(base_url, &accounts.employee),
        employee_reschedule(base_url, &accounts.reschedule),
    ]
}

fn users_page() -> UrlPattern {
    UrlPattern::Regex(regex::Regex::new("/admin/users").expect("static pattern"))
}

fn reschedule_page() -> UrlPattern {
    UrlPattern::Regex(
        regex::Regex::new(r"/employee/appointments\?reschedule=").expect("static pattern"),
    )
}
