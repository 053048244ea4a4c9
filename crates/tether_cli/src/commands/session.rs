//! Session commands.

use super::CommandResult;
use tether_client::{Client, LogoutOutcome};

/// Prints the installation id.
pub fn installation(client: &Client) -> CommandResult {
    println!("{}", client.installation_id()?);
    Ok(())
}

/// Prints the session state.
pub fn status(client: &mut Client) -> CommandResult {
    let server = client.server_url()?.to_string();
    match client.current_user()? {
        Some(user) => {
            println!("server:   {server}");
            println!("session:  {}", user.session_id());
            println!("fields:   {}", user.fields().count());
            println!("pending:  {}", user.pending_changes());
        }
        None => {
            println!("server:   {server}");
            println!("logged out");
        }
    }
    Ok(())
}

/// Logs in as a guest.
pub async fn guest(client: &mut Client) -> CommandResult {
    client.log_in_as_guest().await?;
    print_session(client)
}

/// Creates an account.
pub async fn sign_up(client: &mut Client, email: &str, password: &str) -> CommandResult {
    client.sign_up(email, password).await?;
    print_session(client)
}

/// Logs in.
pub async fn log_in(client: &mut Client, email: &str, password: &str) -> CommandResult {
    client.log_in(email, password).await?;
    print_session(client)
}

/// Converts the guest user.
pub async fn convert(client: &mut Client, email: &str, password: &str) -> CommandResult {
    client.convert_guest_user(email, password).await?;
    println!("converted to {email}");
    Ok(())
}

/// Logs out through the server.
pub async fn log_out(client: &mut Client) -> CommandResult {
    match client.log_out().await? {
        LogoutOutcome::Acknowledged => println!("logged out"),
        LogoutOutcome::Unacknowledged { reason } => {
            println!("logged out locally; server did not confirm: {reason}")
        }
    }
    Ok(())
}

/// Logs out locally.
pub async fn force_log_out(client: &mut Client) -> CommandResult {
    client.force_log_out().await?;
    println!("logged out locally");
    Ok(())
}

fn print_session(client: &mut Client) -> CommandResult {
    if let Some(user) = client.current_user()? {
        println!("logged in, session {}", user.session_id());
    }
    Ok(())
}
