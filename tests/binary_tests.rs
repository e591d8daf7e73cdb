//! Runs the `hellosrv` binary the way an external harness would: set `PORT`,
//! wait for the startup line, probe over HTTP, kill the process.

use color_eyre::eyre::{eyre, Result};
use hellosrv::HttpClient;
use http::{Method, StatusCode};
use std::net::SocketAddr;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};

fn free_port() -> Result<u16> {
    let probe = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(probe.local_addr()?.port())
}

fn spawn_fixture(
    args: &[&str],
    envs: &[(&str, String)],
) -> Result<(Child, Lines<BufReader<ChildStdout>>)> {
    let mut command = Command::new(env!("CARGO_BIN_EXE_hellosrv"));
    command
        .args(args)
        .env_remove("PORT")
        .env_remove("HELLOSRV_ON_BIND_FAILURE")
        .env("NO_COLOR", "1")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .envs(envs.iter().map(|(k, v)| (*k, v.as_str())))
        .kill_on_drop(true);

    let mut child = command.spawn()?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| eyre!("child stdout was not captured"))?;
    Ok((child, BufReader::new(stdout).lines()))
}

async fn scan_for_line(lines: &mut Lines<BufReader<ChildStdout>>, needle: &str) -> Result<String> {
    while let Some(line) = lines.next_line().await? {
        if line.contains(needle) {
            return Ok(line);
        }
    }
    Err(eyre!("process exited before printing {needle:?}"))
}

/// Returns the first stdout line containing `needle`
async fn wait_for_line(lines: &mut Lines<BufReader<ChildStdout>>, needle: &str) -> Result<String> {
    tokio::time::timeout(Duration::from_secs(10), scan_for_line(lines, needle))
        .await
        .map_err(|_| eyre!("timed out waiting for {needle:?}"))?
}

fn loopback(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

#[tokio::test]
async fn test_vendored_fixture_reports_port_and_serves() -> Result<()> {
    let port = free_port()?;
    let (mut child, mut stdout) = spawn_fixture(&[], &[("PORT", port.to_string())])?;

    let line = wait_for_line(&mut stdout, "server is listening on").await?;
    assert!(line.contains(&format!("server is listening on {port}")), "{line}");
    assert!(!line.contains("NOT vendored"), "{line}");

    let mut client = HttpClient::connect(loopback(port)).await?;
    let response = client.get("/").await?;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text()?, "Hello World!");

    child.kill().await?;
    Ok(())
}

#[tokio::test]
async fn test_not_vendored_fixture_reports_its_label() -> Result<()> {
    let port = free_port()?;
    let (mut child, mut stdout) = spawn_fixture(&["not-vendored"], &[("PORT", port.to_string())])?;

    let line = wait_for_line(&mut stdout, "NOT vendored server is listening on").await?;
    assert!(line.contains(&port.to_string()), "{line}");

    let mut client = HttpClient::connect(loopback(port)).await?;
    let response = client
        .request(Method::POST, "/anything", b"{\"arbitrary\": true}")
        .await?;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text()?, "Hello World!");

    child.kill().await?;
    Ok(())
}

#[tokio::test]
async fn test_occupied_port_logs_failure_and_stays_up() -> Result<()> {
    let occupied = std::net::TcpListener::bind("0.0.0.0:0")?;
    let port = occupied.local_addr()?.port();

    let (mut child, mut lines) = spawn_fixture(&[], &[("PORT", port.to_string())])?;
    let line = wait_for_line(&mut lines, "something bad happened").await?;
    assert!(line.contains(&port.to_string()), "{line}");

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(child.try_wait()?.is_none(), "fixture exited after a failed bind");

    child.kill().await?;
    Ok(())
}

#[tokio::test]
async fn test_occupied_port_with_exit_policy_exits() -> Result<()> {
    let occupied = std::net::TcpListener::bind("0.0.0.0:0")?;
    let port = occupied.local_addr()?.port();

    let (mut child, mut stdout) = spawn_fixture(
        &[],
        &[
            ("PORT", port.to_string()),
            ("HELLOSRV_ON_BIND_FAILURE", "exit".to_string()),
        ],
    )?;
    wait_for_line(&mut stdout, "something bad happened").await?;

    let status = tokio::time::timeout(Duration::from_secs(10), child.wait()).await??;
    assert!(!status.success());
    Ok(())
}

#[tokio::test]
async fn test_invalid_port_exits_with_error() -> Result<()> {
    let mut child = Command::new(env!("CARGO_BIN_EXE_hellosrv"))
        .env("PORT", "not-a-port")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()?;

    let status = tokio::time::timeout(Duration::from_secs(10), child.wait()).await??;
    assert!(!status.success());
    Ok(())
}

#[tokio::test]
async fn test_unknown_variant_prints_usage() -> Result<()> {
    let output = Command::new(env!("CARGO_BIN_EXE_hellosrv"))
        .arg("tcp")
        .env("PORT", free_port()?.to_string())
        .output()
        .await?;

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Usage:"), "{stderr}");
    Ok(())
}
