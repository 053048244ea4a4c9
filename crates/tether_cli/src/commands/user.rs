//! User record commands.

use super::{parse_value, print_value, CommandResult};
use tether_client::{Client, Object, Value};

/// Prints `field`, or the whole user when no field is given.
pub fn get(client: &mut Client, field: Option<&str>) -> CommandResult {
    let user = client.current_user()?.ok_or("Not logged in")?;
    let value = match field {
        Some(field) => user.get(field).cloned().unwrap_or(Value::Null),
        None => Value::Object(
            user.fields()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect::<Object>(),
        ),
    };
    print_value(&value)
}

/// Assigns a field and saves the pending change.
pub async fn set(client: &mut Client, field: &str, value: &str) -> CommandResult {
    client
        .current_user()?
        .ok_or("Not logged in")?
        .set(field, parse_value(value));
    client.save_user().await?;
    Ok(())
}

/// Removes a field and saves the pending change.
pub async fn unset(client: &mut Client, field: &str) -> CommandResult {
    client.current_user()?.ok_or("Not logged in")?.unset(field);
    client.save_user().await?;
    Ok(())
}

/// Sends pending changes.
pub async fn sync(client: &mut Client) -> CommandResult {
    let outcome = client.synchronize_user().await?;
    println!(
        "sent {}, applied {}, pending {}",
        outcome.sent, outcome.processed, outcome.remaining
    );
    Ok(())
}
