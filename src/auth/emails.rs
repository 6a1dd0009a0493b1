use lettre::{address::AddressError, message::Mailbox, Message};

use crate::{
    config::Config, errors::AppError, log_and_wrap_custom_internal, mailing::Mailer, models::User,
};

fn build_message(config: &Config, to: &User, subject: &str, body: String) -> Result<Message, AppError> {
    let from = config
        .email_default_sender
        .parse::<Mailbox>()
        .map_err(|e: AddressError| log_and_wrap_custom_internal!(e))?;
    let to = to
        .email
        .parse::<Mailbox>()
        .map_err(|e: AddressError| log_and_wrap_custom_internal!(e))?;

    Message::builder()
        .from(from)
        .to(to)
        .subject(subject)
        .body(body)
        .map_err(|e| log_and_wrap_custom_internal!(e))
}

pub async fn send_activation_email(
    config: &Config,
    mailer: &Mailer,
    user: &User,
    code: &str,
) -> Result<(), AppError> {
    let body = format!(
        "Hi {},\n\nPlease click the following link to activate your account:\n{}\n",
        user.friendly_name(),
        config.build_url(&format!("/activate/{}", code))
    );
    let message = build_message(config, user, "Activate your account", body)?;
    mailer.send(&message).await
}

pub async fn send_password_reset_email(
    config: &Config,
    mailer: &Mailer,
    user: &User,
    code: &str,
) -> Result<(), AppError> {
    let body = format!(
        "Hi {},\n\nSomeone asked to reset your password. If it was you, follow this link:\n{}\n\nOtherwise you can ignore this email.\n",
        user.friendly_name(),
        config.build_url(&format!("/reset-password/{}", code))
    );
    let message = build_message(config, user, "Reset your password", body)?;
    mailer.send(&message).await
}
