use nook_core::auth::AuthError;

use crate::commands::common::Context;
use crate::commands::vault::pin_auth;
use crate::error::CliError;

pub fn run_set(ctx: &Context, pin: &str) -> Result<(), CliError> {
    let auth = pin_auth(ctx);
    let session = auth.begin_session(ctx.user_id())?;
    auth.set_pin(&session, pin)?;
    println!("PIN set. The vault is now encrypted with it.");
    Ok(())
}

pub async fn run_change(ctx: &Context, current: &str, new_pin: &str) -> Result<(), CliError> {
    let auth = pin_auth(ctx);
    let session = auth.begin_session(ctx.user_id())?;
    match auth.change_pin(&session, current, new_pin).await {
        Ok(_) => {
            println!("PIN changed. Items saved under the previous PIN can no longer be opened.");
            Ok(())
        }
        Err(AuthError::IncorrectPin) => Err(CliError::IncorrectPin),
        Err(error) => Err(error.into()),
    }
}

pub async fn run_clear(ctx: &Context, current: &str) -> Result<(), CliError> {
    let auth = pin_auth(ctx);
    let session = auth.begin_session(ctx.user_id())?;
    match auth.clear_pin(&session, current).await {
        Ok(()) => {
            println!("PIN cleared.");
            Ok(())
        }
        Err(AuthError::IncorrectPin) => Err(CliError::IncorrectPin),
        Err(error) => Err(error.into()),
    }
}

pub fn run_check(ctx: &Context, pin: &str) -> Result<(), CliError> {
    let auth = pin_auth(ctx);
    if !auth.has_pin()? {
        println!("No PIN is configured.");
        return Ok(());
    }

    let session = auth.begin_session(ctx.user_id())?;
    if auth.verify(&session, pin)? {
        println!("PIN accepted.");
        Ok(())
    } else {
        Err(CliError::IncorrectPin)
    }
}
