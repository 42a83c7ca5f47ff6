//! Fake appointment portal shared by the integration tests

#![allow(dead_code)]

use std::path::Path;

use flowcheck_e2e::fake::{ClickAction, FakeApp, FakeElement};
use flowcheck_e2e::scenarios::Accounts;
use flowcheck_e2e::HarnessConfig;

pub const BASE: &str = "http://localhost:3000";

/// Knobs for breaking parts of the portal
#[derive(Debug, Clone, Copy, Default)]
pub struct PortalFaults {
    /// "User Management" does nothing when clicked
    pub broken_user_management: bool,
}

/// Login form, both dashboards and the pages they link to.
///
/// Signing in only works for the default accounts and their own role.
pub fn portal(faults: PortalFaults) -> FakeApp {
    let accounts = Accounts::default();

    let sign_in = ClickAction::route(move |form| {
        let email = form.get("NHS Email")?;
        let password = form.get("Password")?;
        let role = form.get("role")?;

        let known: &[_] = match role.as_str() {
            "admin" => &[&accounts.admin],
            "employee" => &[&accounts.employee, &accounts.reschedule],
            _ => return None,
        };
        known
            .iter()
            .any(|a| &a.email == email && &a.password == password)
            .then(|| format!("/{}/dashboard", role))
    });

    let user_management = if faults.broken_user_management {
        ClickAction::Nothing
    } else {
        ClickAction::Navigate("/admin/users".to_string())
    };

    FakeApp::new(BASE)
        .page(
            "/login",
            vec![
                FakeElement::heading("Sign in"),
                FakeElement::textbox("NHS Email"),
                FakeElement::textbox("Password"),
                FakeElement::select("role", &["admin", "employee"]),
                FakeElement::button("Sign In").on_click(sign_in),
            ],
        )
        .page(
            "/admin/dashboard",
            vec![
                FakeElement::heading("Admin Dashboard"),
                FakeElement::button("User Management").on_click(user_management),
            ],
        )
        .page("/admin/users", vec![FakeElement::heading("Users")])
        .page(
            "/employee/dashboard",
            vec![
                FakeElement::heading("Employee Dashboard"),
                FakeElement::button("Reschedule").on_click(ClickAction::Navigate(
                    "/employee/appointments?reschedule=101".to_string(),
                )),
                FakeElement::button("Reschedule").on_click(ClickAction::Navigate(
                    "/employee/appointments?reschedule=202".to_string(),
                )),
            ],
        )
        .page(
            "/employee/appointments",
            vec![
                FakeElement::heading("My Appointments"),
                FakeElement::heading("Date & Time"),
            ],
        )
}

/// Default configuration writing into `output_dir`
pub fn config(output_dir: &Path) -> HarnessConfig {
    let mut config = HarnessConfig::with_defaults();
    config.target.base_url = BASE.to_string();
    config.output_dir = output_dir.to_path_buf();
    config
}
