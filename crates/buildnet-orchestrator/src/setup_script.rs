//! First-run security script executed by the coordinator at startup

use buildnet_types::AdminCredentials;

/// File name of the script in the init directories
pub const SETUP_SCRIPT_NAME: &str = "basic-security.groovy";

/// Init-script directory inside the coordinator container
pub const CONTAINER_INIT_DIR: &str = "/var/jenkins_home/init.groovy.d";

/// Render the script creating the admin account and closing anonymous access
pub fn render(admin: &AdminCredentials) -> String {
    format!(
        r#"#!groovy

import jenkins.model.*
import hudson.security.*
import jenkins.install.InstallState

def instance = Jenkins.getInstance()

def hudsonRealm = new HudsonPrivateSecurityRealm(false)
hudsonRealm.createAccount('{user}', '{password}')
instance.setSecurityRealm(hudsonRealm)

def strategy = new FullControlOnceLoggedInAuthorizationStrategy()
strategy.setAllowAnonymousRead(false)
instance.setAuthorizationStrategy(strategy)

instance.setInstallState(InstallState.INITIAL_SETUP_COMPLETED)
instance.save()
"#,
        user = quote(&admin.username),
        password = quote(&admin.password),
    )
}

/// Escape for a single-quoted groovy string
fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '\'' => quoted.push_str("\\'"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            other => quoted.push(other),
        }
    }
    quoted
}
