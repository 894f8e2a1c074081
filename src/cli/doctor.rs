//! Doctor command - check model bundle, policy and alert channel

use anyhow::Result;
use console::style;

use super::load_bundle;
use crate::config::{UserConfig, ENV_WEBHOOK_TOKEN};
use crate::encoder::Encoder;
use crate::explain::Explainer;
use crate::notify::{build_sink, NotifyChannel};
use crate::schema::InputContract;

pub(super) fn run(config: &UserConfig) -> Result<()> {
    println!("{} churnlens doctor\n", style("🩺").bold());
    let mut problems = 0;

    // Model bundle
    let bundle = match load_bundle(config) {
        Ok(bundle) => {
            println!(
                "{} Model bundle: {} {} ({} columns) from {}",
                style("✓").green(),
                bundle.kind(),
                bundle.version().unwrap_or("unversioned"),
                bundle.schema().len(),
                bundle.source()
            );
            Some(bundle)
        }
        Err(e) => {
            println!("{} Model bundle: {e:#}", style("✗").red());
            problems += 1;
            None
        }
    };

    // Schema/model pairing: score and explain the form-default customer
    if let Some(bundle) = &bundle {
        let contract = InputContract::telco();
        let encoder = Encoder::new(bundle.schema().clone(), contract.clone());
        let classifier = bundle.classifier();
        let probe = encoder
            .encode(&contract.default_record())
            .and_then(|vector| {
                let p = classifier.predict_probability(&vector)?;
                Ok((vector, p))
            });

        match probe {
            Ok((vector, p)) => {
                println!(
                    "{} Schema pairing: probe customer scored {:.2}%",
                    style("✓").green(),
                    p * 100.0
                );
                let explainer = Explainer::new(bundle.schema().clone());
                match explainer.explain(classifier.as_ref(), &vector, 1) {
                    Ok(_) => println!("{} Explanations: TreeSHAP available", style("✓").green()),
                    Err(e) if e.is_unsupported_model() => {
                        println!("{} Explanations: unavailable ({e})", style("○").dim())
                    }
                    Err(e) => {
                        println!("{} Explanations: {e}", style("✗").red());
                        problems += 1;
                    }
                }
            }
            Err(e) => {
                println!("{} Schema pairing: {e}", style("✗").red());
                problems += 1;
            }
        }
    }

    // Risk policy
    match config.risk_policy() {
        Ok(policy) => println!(
            "{} Risk policy: HIGH >= {}, MEDIUM >= {}, alerts at >= {}",
            style("✓").green(),
            policy.high_threshold,
            policy.medium_threshold,
            policy.medium_threshold
        ),
        Err(e) => {
            println!("{} Risk policy: {e}", style("✗").red());
            problems += 1;
        }
    }

    // Alert channel
    let channel = config.notify_channel();
    match build_sink(config) {
        Ok(None) => println!("{} Alert channel: none (alerts are not delivered)", style("○").dim()),
        Ok(Some(_)) => {
            let detail = match channel {
                NotifyChannel::Webhook => config.webhook_url().unwrap_or_default().to_string(),
                NotifyChannel::Outbox => config.outbox_path().display().to_string(),
                _ => "warn-level log".to_string(),
            };
            println!("{} Alert channel: {channel} ({detail})", style("✓").green());
        }
        Err(e) => {
            println!("{} Alert channel: {e}", style("✗").red());
            problems += 1;
        }
    }

    if channel == NotifyChannel::Webhook {
        if config.webhook_token().is_some() {
            println!("{} {ENV_WEBHOOK_TOKEN}: set", style("✓").green());
        } else {
            println!(
                "{} {ENV_WEBHOOK_TOKEN}: not set (webhook requests are unauthenticated)",
                style("○").dim()
            );
        }
    }

    if problems > 0 {
        anyhow::bail!("doctor found {problems} problem(s)");
    }
    println!("\n{} All checks passed!", style("✅").bold());
    Ok(())
}
