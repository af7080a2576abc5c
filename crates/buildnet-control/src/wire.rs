//! Coordinator wire contract
//!
//! Paths, identifiers and form payloads understood by the coordinator. Field
//! names here are reproduced exactly; the coordinator rejects anything else.

use serde::Deserialize;
use serde_json::json;

/// Readiness probe target
pub const LOGIN_PATH: &str = "/login";

/// CSRF crumb issuer
pub const CRUMB_PATH: &str = "/crumbIssuer/api/json";

/// Credential listing restricted to ids
pub const CREDENTIAL_LIST_PATH: &str =
    "/manage/credentials/store/system/domain/_/api/json?tree=credentials[id]";

pub const CREDENTIAL_CREATE_PATH: &str = "/manage/credentials/store/system/domain/_/createCredentials";

/// Page visited to obtain a session cookie before node creation
pub const NODE_SESSION_PATH: &str = "/computer/new";

pub const NODE_CREATE_PATH: &str = "/computer/doCreateItem";

/// Installed extension listing restricted to short names
pub const EXTENSION_LIST_PATH: &str = "/pluginManager/api/json?depth=1&tree=plugins[shortName]";

pub const EXTENSION_INSTALL_PATH: &str = "/pluginManager/installNecessaryPlugins";

/// Fixed identifier of the shared SSH credential
pub const CREDENTIAL_ID: &str = "jenkins-agent-ssh-key";

/// Login user on the worker side of the SSH trust
pub const CREDENTIAL_USERNAME: &str = "jenkins";

pub const CREDENTIAL_DESCRIPTION: &str = "SSH key for Jenkins agent";

pub const DEFAULT_REMOTE_FS: &str = "/home/jenkins";

const SSH_USER_PRIVATE_KEY: &str =
    "com.cloudbees.jenkins.plugins.sshcredentials.impl.BasicSSHUserPrivateKey";
const DIRECT_ENTRY_KEY_SOURCE: &str =
    "com.cloudbees.jenkins.plugins.sshcredentials.impl.BasicSSHUserPrivateKey$DirectEntryPrivateKeySource";
const SSH_LAUNCHER: &str = "hudson.plugins.sshslaves.SSHLauncher";
const NON_VERIFYING_STRATEGY: &str =
    "hudson.plugins.sshslaves.verifiers.NonVerifyingKeyVerificationStrategy";
const RETENTION_ALWAYS: &str = "hudson.slaves.RetentionStrategy$Always";
const RETENTION_SCHEDULED: &str = "hudson.slaves.SimpleScheduledRetentionStrategy";
const RETENTION_DEMAND: &str = "hudson.slaves.RetentionStrategy$Demand";
const DUMB_SLAVE: &str = "hudson.slaves.DumbSlave";

const LAUNCH_TIMEOUT_SECONDS: &str = "60";
const MAX_NUM_RETRIES: &str = "10";
const RETRY_WAIT_TIME: &str = "15";

/// CSRF token issued by the coordinator
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Crumb {
    /// Header name the token must be sent under
    #[serde(rename = "crumbRequestField")]
    pub field: String,
    #[serde(rename = "crumb")]
    pub value: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CredentialListing {
    #[serde(default)]
    pub credentials: Vec<CredentialEntry>,
}

#[derive(Debug, Deserialize)]
pub struct CredentialEntry {
    #[serde(default)]
    pub id: String,
}

impl CredentialListing {
    pub fn contains(&self, id: &str) -> bool {
        self.credentials.iter().any(|c| c.id == id)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ExtensionListing {
    #[serde(default)]
    pub plugins: Vec<ExtensionEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ExtensionEntry {
    #[serde(rename = "shortName")]
    pub short_name: String,
}

impl ExtensionListing {
    pub fn names(self) -> Vec<String> {
        self.plugins.into_iter().map(|p| p.short_name).collect()
    }
}

/// Path of a node's JSON description
pub fn node_path(name: &str) -> String {
    format!("/computer/{}/api/json", name)
}

/// Form body creating the shared SSH credential from a private key
pub fn credential_form(private_key: &str) -> Vec<(String, String)> {
    let payload = json!({
        "": "0",
        "credentials": {
            "scope": "GLOBAL",
            "id": CREDENTIAL_ID,
            "username": CREDENTIAL_USERNAME,
            "description": CREDENTIAL_DESCRIPTION,
            "privateKeySource": {
                "value": "0",
                "privateKey": private_key,
                "stapler-class": DIRECT_ENTRY_KEY_SOURCE,
            },
            "stapler-class": SSH_USER_PRIVATE_KEY,
            "$class": SSH_USER_PRIVATE_KEY,
        }
    });

    vec![
        ("json".to_string(), payload.to_string()),
        ("Submit".to_string(), "OK".to_string()),
    ]
}

/// Node creation request: an SSH launcher pointing at `host:port`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRequest<'a> {
    pub name: &'a str,
    pub host: &'a str,
    pub port: u16,
    pub remote_fs: &'a str,
}

impl NodeRequest<'_> {
    /// Descriptor carried in the `json` field of the creation form
    pub fn descriptor(&self, crumb: &str) -> serde_json::Value {
        json!({
            "name": self.name,
            "nodeDescription": "",
            "numExecutors": "1",
            "remoteFS": self.remote_fs,
            "labelString": "",
            "mode": "NORMAL",
            "": [SSH_LAUNCHER, "0"],
            "launcher": {
                "stapler-class": SSH_LAUNCHER,
                "$class": SSH_LAUNCHER,
                "host": self.host,
                "port": self.port,
                "credentialsId": CREDENTIAL_ID,
                "launchTimeoutSeconds": LAUNCH_TIMEOUT_SECONDS,
                "maxNumRetries": MAX_NUM_RETRIES,
                "retryWaitTime": RETRY_WAIT_TIME,
                "sshHostKeyVerificationStrategy": {
                    "stapler-class": NON_VERIFYING_STRATEGY,
                    "$class": NON_VERIFYING_STRATEGY,
                }
            },
            "retentionStrategy": {
                "stapler-class": RETENTION_ALWAYS,
                "$class": RETENTION_ALWAYS,
            },
            "nodeProperties": { "stapler-class-bag": "true" },
            "type": DUMB_SLAVE,
            "Submit": "",
            "Jenkins-Crumb": crumb,
        })
    }

    /// Full form body of `doCreateItem`, repeated keys included
    pub fn form(&self, crumb: &str) -> Vec<(String, String)> {
        let mut form: Vec<(String, String)> = Vec::with_capacity(32);
        let mut push = |key: &str, value: &str| form.push((key.to_string(), value.to_string()));

        push("name", self.name);
        push("nodeDescription", "");
        push("_.numExecutors", "1");
        push("_.remoteFS", self.remote_fs);
        push("_.labelString", "");
        push("mode", "NORMAL");
        for key in ["stapler-class", "$class"] {
            for class in [SSH_LAUNCHER, RETENTION_ALWAYS, RETENTION_SCHEDULED, RETENTION_DEMAND] {
                push(key, class);
            }
        }
        push("_.host", self.host);
        push("_.port", &self.port.to_string());
        push("_.credentialsId", CREDENTIAL_ID);
        push("_.launchTimeoutSeconds", LAUNCH_TIMEOUT_SECONDS);
        push("_.maxNumRetries", MAX_NUM_RETRIES);
        push("_.retryWaitTime", RETRY_WAIT_TIME);
        push("_.sshHostKeyVerificationStrategy", "0");
        push("stapler-class-sshHostKeyVerificationStrategy", NON_VERIFYING_STRATEGY);
        push("stapler-class-bag", "true");
        push("_.freeDiskSpaceThreshold", "1GiB");
        push("_.freeDiskSpaceWarningThreshold", "2GiB");
        push("_.freeTempSpaceThreshold", "1GiB");
        push("_.freeTempSpaceWarningThreshold", "2GiB");
        push("type", DUMB_SLAVE);
        push("Submit", "");
        push("json", &self.descriptor(crumb).to_string());
        form
    }
}

/// XML body requesting installation of one extension at its latest version
pub fn extension_install_body(name: &str) -> String {
    format!(
        "<jenkins><install plugin=\"{}@latest\" /></jenkins>",
        xml_escape(name)
    )
}

fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values<'a>(form: &'a [(String, String)], key: &str) -> Vec<&'a str> {
        form.iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    #[test]
    fn test_crumb_deserializes_wire_names() {
        let crumb: Crumb = serde_json::from_str(
            r#"{"_class":"hudson.security.csrf.DefaultCrumbIssuer","crumb":"abc123","crumbRequestField":"Jenkins-Crumb"}"#,
        )
        .unwrap();
        assert_eq!(crumb.field, "Jenkins-Crumb");
        assert_eq!(crumb.value, "abc123");
    }

    #[test]
    fn test_credential_form() {
        let form = credential_form("-----BEGIN KEY-----\nabc\n");
        assert_eq!(values(&form, "Submit"), vec!["OK"]);

        let payload: serde_json::Value = serde_json::from_str(values(&form, "json")[0]).unwrap();
        assert_eq!(payload[""], "0");
        assert_eq!(payload["credentials"]["id"], CREDENTIAL_ID);
        assert_eq!(payload["credentials"]["scope"], "GLOBAL");
        assert_eq!(payload["credentials"]["username"], "jenkins");
        assert_eq!(
            payload["credentials"]["privateKeySource"]["privateKey"],
            "-----BEGIN KEY-----\nabc\n"
        );
        assert_eq!(payload["credentials"]["$class"], SSH_USER_PRIVATE_KEY);
    }

    #[test]
    fn test_node_form_fields() {
        let request = NodeRequest {
            name: "jenkins-local-agent-1",
            host: "jenkins-local-agent-1",
            port: 22,
            remote_fs: DEFAULT_REMOTE_FS,
        };
        let form = request.form("crumb-1");

        assert_eq!(values(&form, "name"), vec!["jenkins-local-agent-1"]);
        assert_eq!(values(&form, "_.host"), vec!["jenkins-local-agent-1"]);
        assert_eq!(values(&form, "_.port"), vec!["22"]);
        assert_eq!(values(&form, "_.credentialsId"), vec![CREDENTIAL_ID]);
        assert_eq!(values(&form, "_.launchTimeoutSeconds"), vec!["60"]);
        assert_eq!(values(&form, "_.maxNumRetries"), vec!["10"]);
        assert_eq!(values(&form, "stapler-class").len(), 4);
        assert_eq!(values(&form, "$class")[0], SSH_LAUNCHER);
        assert_eq!(values(&form, "type"), vec![DUMB_SLAVE]);

        let descriptor: serde_json::Value = serde_json::from_str(values(&form, "json")[0]).unwrap();
        assert_eq!(descriptor["launcher"]["port"], 22);
        assert_eq!(descriptor["launcher"]["host"], "jenkins-local-agent-1");
        assert_eq!(
            descriptor["launcher"]["sshHostKeyVerificationStrategy"]["$class"],
            NON_VERIFYING_STRATEGY
        );
        assert_eq!(descriptor["Jenkins-Crumb"], "crumb-1");
        assert_eq!(descriptor[""][0], SSH_LAUNCHER);
    }

    #[test]
    fn test_extension_install_body_escapes() {
        assert_eq!(
            extension_install_body("git"),
            "<jenkins><install plugin=\"git@latest\" /></jenkins>"
        );
        assert!(extension_install_body("a\"b").contains("a&quot;b@latest"));
    }

    #[test]
    fn test_listings() {
        let creds: CredentialListing = serde_json::from_str(
            r#"{"_class":"x","credentials":[{"_class":"y","id":"jenkins-agent-ssh-key"}]}"#,
        )
        .unwrap();
        assert!(creds.contains(CREDENTIAL_ID));
        assert!(!creds.contains("other"));

        let plugins: ExtensionListing =
            serde_json::from_str(r#"{"plugins":[{"shortName":"git"},{"shortName":"credentials"}]}"#)
                .unwrap();
        assert_eq!(plugins.names(), vec!["git", "credentials"]);
    }
}
