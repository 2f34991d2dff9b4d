//! systemd unit descriptors and the conventional product layout.

use std::fmt::Write as _;

/// Ordered `[Section]` to `key=value` pairs.
///
/// Keys may repeat within a section (systemd allows e.g. several
/// `ExecStartPre=`); insertion order is preserved so rendering is
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceUnitDescriptor {
    sections: Vec<(String, Vec<(String, String)>)>,
}

impl ServiceUnitDescriptor {
    /// An empty descriptor.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sections: Vec::new(),
        }
    }

    fn section_mut(&mut self, section: &str) -> &mut Vec<(String, String)> {
        let index = match self.sections.iter().position(|(name, _)| name == section) {
            Some(index) => index,
            None => {
                self.sections.push((section.to_string(), Vec::new()));
                self.sections.len() - 1
            }
        };
        &mut self.sections[index].1
    }

    /// Sets a key, replacing every existing entry for it.
    #[must_use]
    pub fn set(mut self, section: &str, key: &str, value: impl Into<String>) -> Self {
        let entries = self.section_mut(section);
        entries.retain(|(k, _)| k != key);
        entries.push((key.to_string(), value.into()));
        self
    }

    /// Appends a key without touching existing entries.
    #[must_use]
    pub fn append(mut self, section: &str, key: &str, value: impl Into<String>) -> Self {
        self.section_mut(section).push((key.to_string(), value.into()));
        self
    }

    /// Values of a key in a section, in order.
    #[must_use]
    pub fn get(&self, section: &str, key: &str) -> Vec<&str> {
        self.sections
            .iter()
            .filter(|(name, _)| name == section)
            .flat_map(|(_, entries)| entries.iter())
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Section names in order.
    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|(name, _)| name.as_str())
    }

    /// Renders the unit file text.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (index, (name, entries)) in self.sections.iter().enumerate() {
            if index > 0 {
                out.push('\n');
            }
            let _ = writeln!(out, "[{name}]");
            for (key, value) in entries {
                let _ = writeln!(out, "{key}={value}");
            }
        }
        out
    }

    /// The default unit for a product laid out per [`ServiceLayout`].
    #[must_use]
    pub fn for_product(layout: &ServiceLayout) -> Self {
        Self::new()
            .set("Unit", "Description", format!("{} service", layout.product))
            .set("Unit", "Requires", "network-online.target")
            .set("Unit", "After", "network-online.target")
            .set("Unit", "ConditionFileNotEmpty", layout.config_path.clone())
            .set("Service", "Type", "simple")
            .set("Service", "User", layout.user.clone())
            .set("Service", "Group", layout.user.clone())
            .set("Service", "EnvironmentFile", format!("-{}", layout.env_path))
            .set("Service", "ExecStart", layout.exec_start())
            .set("Service", "ExecReload", "/bin/kill --signal HUP $MAINPID")
            .set("Service", "KillMode", "process")
            .set("Service", "KillSignal", "SIGINT")
            .set("Service", "Restart", "on-failure")
            .set("Service", "RestartSec", "5")
            .set("Service", "LimitNOFILE", "65536")
            .set("Install", "WantedBy", "multi-user.target")
    }
}

/// Conventional on-host paths for a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceLayout {
    /// Product name, e.g. `vault`.
    pub product: String,
    /// System user the service runs as.
    pub user: String,
    /// Configuration directory.
    pub config_dir: String,
    /// Main configuration file.
    pub config_path: String,
    /// Environment file.
    pub env_path: String,
    /// License file.
    pub license_path: String,
    /// Data directory.
    pub data_dir: String,
    /// Unit file path.
    pub unit_path: String,
    /// Binary path.
    pub binary: String,
    /// Arguments passed to the binary.
    pub args: String,
}

impl ServiceLayout {
    /// `/etc/<p>.d/<p>.hcl`, `/etc/<p>.d/<p>.env`, `/etc/<p>.d/<p>.hclic`,
    /// `/opt/<p>/data`, `/etc/systemd/system/<p>.service`.
    #[must_use]
    pub fn for_product(product: &str) -> Self {
        let config_dir = format!("/etc/{product}.d");
        let config_path = format!("{config_dir}/{product}.hcl");
        Self {
            product: product.to_string(),
            user: product.to_string(),
            env_path: format!("{config_dir}/{product}.env"),
            license_path: format!("{config_dir}/{product}.hclic"),
            data_dir: format!("/opt/{product}/data"),
            unit_path: format!("/etc/systemd/system/{product}.service"),
            binary: format!("/usr/bin/{product}"),
            args: format!("server -config={config_path}"),
            config_dir,
            config_path,
        }
    }

    /// Unit name without the `.service` suffix.
    #[must_use]
    pub fn unit_name(&self) -> &str {
        self.unit_path
            .rsplit('/')
            .next()
            .and_then(|file| file.strip_suffix(".service"))
            .unwrap_or(&self.product)
    }

    /// `ExecStart=` value.
    #[must_use]
    pub fn exec_start(&self) -> String {
        if self.args.is_empty() {
            self.binary.clone()
        } else {
            format!("{} {}", self.binary, self.args)
        }
    }
}

/// Renders an environment file, one `KEY="value"` per line, sorted by key.
#[must_use]
pub fn render_env_file<'a, I>(vars: I) -> String
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let mut pairs: Vec<_> = vars.into_iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));

    let mut out = String::new();
    for (key, value) in pairs {
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        let _ = writeln!(out, "{key}=\"{escaped}\"");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_layout_for_product() {
        let layout = ServiceLayout::for_product("vault");

        assert_eq!(layout.config_path, "/etc/vault.d/vault.hcl");
        assert_eq!(layout.env_path, "/etc/vault.d/vault.env");
        assert_eq!(layout.license_path, "/etc/vault.d/vault.hclic");
        assert_eq!(layout.data_dir, "/opt/vault/data");
        assert_eq!(layout.unit_path, "/etc/systemd/system/vault.service");
        assert_eq!(layout.unit_name(), "vault");
    }

    #[test]
    fn test_render_is_deterministic_and_ordered() {
        let unit = ServiceUnitDescriptor::new()
            .set("Unit", "Description", "consul")
            .set("Service", "ExecStart", "/usr/bin/consul agent")
            .set("Install", "WantedBy", "multi-user.target");

        assert_eq!(
            unit.render(),
            "[Unit]\nDescription=consul\n\n[Service]\nExecStart=/usr/bin/consul agent\n\n[Install]\nWantedBy=multi-user.target\n"
        );
        assert_eq!(unit.render(), unit.clone().render());
    }

    #[test]
    fn test_set_replaces_append_keeps() {
        let unit = ServiceUnitDescriptor::new()
            .set("Service", "ExecStartPre", "/bin/true")
            .append("Service", "ExecStartPre", "/bin/echo ready")
            .set("Service", "User", "a")
            .set("Service", "User", "b");

        assert_eq!(unit.get("Service", "ExecStartPre"), vec!["/bin/true", "/bin/echo ready"]);
        assert_eq!(unit.get("Service", "User"), vec!["b"]);
    }

    #[test]
    fn test_default_unit_for_product() {
        let layout = ServiceLayout::for_product("boundary");
        let unit = ServiceUnitDescriptor::for_product(&layout);

        assert_eq!(unit.section_names().collect::<Vec<_>>(), vec!["Unit", "Service", "Install"]);
        assert_eq!(
            unit.get("Service", "ExecStart"),
            vec!["/usr/bin/boundary server -config=/etc/boundary.d/boundary.hcl"]
        );
        assert_eq!(unit.get("Service", "EnvironmentFile"), vec!["-/etc/boundary.d/boundary.env"]);
    }

    #[test]
    fn test_env_file_sorted_and_escaped() {
        let mut vars = HashMap::new();
        vars.insert(String::from("VAULT_LICENSE_PATH"), String::from("/etc/vault.d/vault.hclic"));
        vars.insert(String::from("GREETING"), String::from("say \"hi\""));

        assert_eq!(
            render_env_file(&vars),
            "GREETING=\"say \\\"hi\\\"\"\nVAULT_LICENSE_PATH=\"/etc/vault.d/vault.hclic\"\n"
        );
    }
}
