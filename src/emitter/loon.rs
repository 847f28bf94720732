//! Loon INI emitter
//!
//! Loon quotes credential fields and names its transports (`transport=ws`).
//! Rule lists go to `[Remote Rule]` with a policy per list.

use std::fmt::Write;

use tracing::debug;

use crate::node::{Credential, Network, Node, TlsOpts};

use super::policy::{self, GroupKind, Policy, PolicyGroup};
use super::{EmitError, Emitter, IniLine, ini_safe_name, write_ini_section};

pub struct LoonEmitter;

/// Loon has no escape for `"` inside a quoted field
fn quoted(value: &str) -> String {
    let value: String = value
        .chars()
        .filter(|c| *c != '"' && !c.is_control())
        .collect();
    format!("\"{}\"", value)
}

impl LoonEmitter {
    fn proxy_value(node: &Node) -> Option<String> {
        let host = &node.endpoint.host;
        let port = node.endpoint.port;

        let line = match &node.credential {
            Credential::Shadowsocks(c) => {
                let mut line = IniLine::new("Shadowsocks", host, port);
                line.push(&c.cipher).push(quoted(&c.password));
                if let Some(plugin) = &c.plugin {
                    if !plugin.is_obfs() {
                        return None;
                    }
                    line.kv_opt("obfs-name", plugin.opt("obfs"))
                        .kv_opt("obfs-host", plugin.opt("obfs-host"));
                }
                line.kv("udp", true);
                line
            }
            Credential::ShadowsocksR(c) => {
                let mut line = IniLine::new("ShadowsocksR", host, port);
                line.push(&c.cipher)
                    .push(quoted(&c.password))
                    .kv("protocol", &c.protocol)
                    .kv("protocol-param", c.protocol_param.as_deref().unwrap_or_default())
                    .kv("obfs", &c.obfs)
                    .kv("obfs-param", c.obfs_param.as_deref().unwrap_or_default());
                line
            }
            Credential::Vmess(c) => {
                let mut line = IniLine::new("vmess", host, port);
                line.push(&c.cipher).push(quoted(&c.uuid));
                push_transport(&mut line, node)?;
                push_over_tls(&mut line, node.tls())?;
                line.kv("alterId", c.alter_id);
                line
            }
            Credential::Trojan(c) => {
                let mut line = IniLine::new("trojan", host, port);
                line.push(quoted(&c.password));
                let tls = node.tls().cloned().unwrap_or_else(TlsOpts::enabled);
                push_tls_name(&mut line, &tls)?;
                push_transport(&mut line, node)?;
                line
            }
            Credential::Hysteria2(c) => {
                let mut line = IniLine::new("Hysteria2", host, port);
                line.push(quoted(&c.password));
                if let Some(tls) = &node.transport.tls {
                    push_tls_name(&mut line, tls)?;
                }
                if c.obfs.is_some() {
                    line.kv_opt("salamander-password", c.obfs_password.as_deref());
                }
                line.kv_opt("download-bandwidth", c.down_mbps).kv("udp", true);
                line
            }
            Credential::Socks5(c) => {
                let mut line = IniLine::new("socks5", host, port);
                if let (Some(user), Some(pass)) = (&c.username, &c.password) {
                    line.push(user).push(quoted(pass));
                }
                line
            }
            Credential::Vless(_)
            | Credential::Hysteria(_)
            | Credential::Tuic(_)
            | Credential::AnyTls(_)
            | Credential::Unknown(_) => return None,
        };

        Some(line.join(","))
    }
}

/// `transport=ws,path=,host=`; `None` for transports Loon lacks
fn push_transport(line: &mut IniLine, node: &Node) -> Option<()> {
    let transport = &node.transport;
    match transport.network {
        Network::Tcp => {
            line.kv("transport", "tcp");
        }
        Network::Ws | Network::H2 => {
            let name = if transport.network == Network::Ws { "ws" } else { "http" };
            line.kv("transport", name)
                .kv("path", transport.path.as_deref().unwrap_or("/"))
                .kv_opt("host", transport.host.as_deref());
        }
        _ => return None,
    }
    Some(())
}

/// `over-tls=true,sni=`, as vmess writes it
fn push_over_tls(line: &mut IniLine, tls: Option<&TlsOpts>) -> Option<()> {
    let Some(tls) = tls else {
        line.kv("over-tls", false);
        return Some(());
    };
    if tls.is_reality() {
        return None;
    }
    line.kv("over-tls", true)
        .kv_opt("sni", tls.sni.as_deref())
        .kv("skip-cert-verify", tls.insecure);
    Some(())
}

/// trojan and hysteria2 always run TLS and only name the server
fn push_tls_name(line: &mut IniLine, tls: &TlsOpts) -> Option<()> {
    if tls.is_reality() {
        return None;
    }
    line.kv_opt("tls-name", tls.sni.as_deref())
        .kv("skip-cert-verify", tls.insecure);
    Some(())
}

fn group_line(group: &PolicyGroup) -> String {
    let kind = match group.kind {
        GroupKind::Select => "select",
        GroupKind::UrlTest => "url-test",
    };
    let mut line = format!("{} = {},{}", group.name, kind, group.members.join(","));
    if group.kind == GroupKind::UrlTest {
        line.push_str(&format!(
            ",url={},interval={},tolerance={}",
            policy::TEST_URL,
            policy::TEST_INTERVAL_SECS,
            policy::TEST_TOLERANCE_MS
        ));
    }
    line
}

impl Emitter for LoonEmitter {
    fn emit(&self, nodes: &[Node], label: &str) -> Result<String, EmitError> {
        let mut names = policy::name_registry();
        let mut proxy_lines = Vec::with_capacity(nodes.len());
        let mut proxy_names = Vec::with_capacity(nodes.len());

        for node in nodes {
            let Some(value) = Self::proxy_value(node) else {
                debug!("Skipping {} node '{}' for Loon", node.protocol(), node.name);
                continue;
            };
            let name = names.claim(&ini_safe_name(&node.name));
            proxy_lines.push(format!("{} = {}", name, value));
            proxy_names.push(name);
        }

        let policy = Policy::build(&proxy_names);

        let remote_rules = policy.rules.iter().map(|rule| {
            format!(
                "{}, policy={}, tag={}, enabled=true",
                rule.source.ini_list_url("Loon"),
                rule.target,
                rule.source.list
            )
        });

        let mut out = String::new();
        writeln!(out, "# {}", label.lines().next().unwrap_or_default())?;
        writeln!(out)?;
        write_ini_section(
            &mut out,
            "General",
            [
                "ip-mode = ipv4-only".to_string(),
                "dns-server = system,223.5.5.5,119.29.29.29".to_string(),
                "skip-proxy = 127.0.0.1,192.168.0.0/16,10.0.0.0/8,172.16.0.0/12,100.64.0.0/10,localhost,*.local"
                    .to_string(),
                format!("proxy-test-url = {}", policy::TEST_URL),
            ],
        )?;
        write_ini_section(&mut out, "Proxy", proxy_lines)?;
        write_ini_section(&mut out, "Proxy Group", policy.groups.iter().map(group_line))?;
        write_ini_section(&mut out, "Remote Rule", remote_rules)?;
        write_ini_section(
            &mut out,
            "Rule",
            [
                format!("GEOIP,CN,{}", policy::DIRECT),
                format!("FINAL,{}", policy.final_target),
            ],
        )?;

        Ok(out)
    }
}
