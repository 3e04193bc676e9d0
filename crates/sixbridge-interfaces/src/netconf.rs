//! Host network configuration through the `ip` command.
//!
//! The bridge shells out to `ip` rather than speaking netlink directly. Every command is awaited and a non-zero exit becomes
//! [`InterfaceError::CommandFailed`].

use std::net::Ipv6Addr;

use tokio::process::Command;
use tracing::debug;

use crate::error::InterfaceError;

/// `ip -6 addr add <addr>/<prefix_len> dev <ifname>`
pub async fn ip_addr_add(ifname: &str, addr: Ipv6Addr, prefix_len: u8) -> Result<(), InterfaceError> {
    let cidr = format!("{addr}/{prefix_len}");
    run("ip", &["-6", "addr", "add", &cidr, "dev", ifname]).await
}

/// `ip link set <ifname> up`
pub async fn ip_link_up(ifname: &str) -> Result<(), InterfaceError> {
    run("ip", &["link", "set", ifname, "up"]).await
}

async fn run(program: &str, args: &[&str]) -> Result<(), InterfaceError> {
    let command = render(program, args);
    debug!("running `{}`", command);

    let output = Command::new(program).args(args).output().await?;
    if output.status.success() {
        return Ok(());
    }
    Err(InterfaceError::CommandFailed {
        command,
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

fn render(program: &str, args: &[&str]) -> String {
    let mut command = program.to_string();
    for arg in args {
        command.push(' ');
        command.push_str(arg);
    }
    command
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_joins_arguments() {
        assert_eq!(
            render("ip", &["link", "set", "tun0", "up"]),
            "ip link set tun0 up"
        );
    }

    #[tokio::test]
    async fn missing_program_is_io_error() {
        let err = run("sixbridge-no-such-program", &[]).await.unwrap_err();
        assert!(matches!(err, InterfaceError::Io(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_reported() {
        match run("false", &[]).await.unwrap_err() {
            InterfaceError::CommandFailed { command, .. } => assert_eq!(command, "false"),
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn successful_command() {
        run("true", &[]).await.unwrap();
    }
}
