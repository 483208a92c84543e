use serde::{Deserialize, Serialize};

fn default_template() -> String {
    "Usuário: #user_iptv#\nSenha: #pass_iptv#\nM3U: #url_m3u#\nDNS1: #dns_iptv#\nDNS2: #dns_iptv2#\nDNS3: #dns_iptv3#".to_string()
}

/// Panel settings, persisted as their own flat collection. The template is
/// what resellers copy-paste to customers; placeholders are substituted per
/// client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelSettings {
    #[serde(default = "default_template")]
    pub client_info_template: String,
    #[serde(default)]
    pub public_url2: String,
    #[serde(default)]
    pub public_url3: String,
    /// Gates panel logins for non-admin accounts. Playback endpoints are
    /// not affected.
    #[serde(default)]
    pub maintenance_mode: bool,
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self {
            client_info_template: default_template(),
            public_url2: String::new(),
            public_url3: String::new(),
            maintenance_mode: false,
        }
    }
}
