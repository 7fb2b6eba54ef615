//! Terminal consumers.
//!
//! Nothing is persisted; each sink records what it would store or send in
//! the log.

use msgflow_core::config::PipelineConfig;
use msgflow_core::pipeline::PipelineBuilder;
use msgflow_sdk::{PaymentMessage, UserMessage, ValidatedAddressMessage};

/// Attach every server sink to `builder`.
pub fn attach(builder: PipelineBuilder) -> PipelineBuilder {
    builder
        .on_user("save_user", save_user)
        .on_user("email_user", email_user)
        .on_validated_address("save_address", save_address)
        .on_taxed_payment("save_payment", save_payment)
}

/// Build a pipeline with the server sinks attached.
pub fn pipeline(config: PipelineConfig) -> PipelineBuilder {
    attach(msgflow_core::pipeline::Pipeline::builder(config))
}

fn save_user(user: UserMessage) -> anyhow::Result<()> {
    tracing::info!(
        email = %user.email,
        first_name = %user.first_name,
        last_name = %user.last_name,
        age = user.age,
        "Saving user"
    );
    Ok(())
}

fn email_user(user: UserMessage) -> anyhow::Result<()> {
    if user.email.trim().is_empty() {
        anyhow::bail!("user {} {} has no email address", user.first_name, user.last_name);
    }
    tracing::info!(email = %user.email, "Sending welcome email");
    Ok(())
}

fn save_address(address: ValidatedAddressMessage) -> anyhow::Result<()> {
    let data = &address.data;
    if address.is_valid {
        tracing::info!(
            user_id = ?data.user_id,
            city = %data.city,
            postcode = %data.postcode,
            "Saving address"
        );
    } else {
        tracing::warn!(
            user_id = ?data.user_id,
            address1 = %data.address1,
            postcode = %data.postcode,
            "Saving invalid address"
        );
    }
    Ok(())
}

fn save_payment(payment: PaymentMessage) -> anyhow::Result<()> {
    tracing::info!(
        vendor = %payment.vendor,
        amount = %payment.amount,
        taxed_amount = %payment.taxed_amount,
        "Saving payment"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use msgflow_sdk::AddressMessage;

    #[test]
    fn test_email_sink_rejects_missing_address() {
        assert!(email_user(UserMessage::new("", "John", "Doe", 20)).is_err());
        assert!(email_user(UserMessage::new("test@test.com", "John", "Doe", 20)).is_ok());
    }

    #[test]
    fn test_invalid_addresses_are_still_saved() {
        let address = ValidatedAddressMessage {
            is_valid: false,
            data: AddressMessage::new("X", "X", "X", "XXX"),
        };
        assert!(save_address(address).is_ok());
    }
}
