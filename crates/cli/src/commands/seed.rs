use crate::commands::{exit, load_config, runtime, CommandResult};
use onay_db::{connect_from_config, migrations, DemoSeedDataset, EntitySeedInfo};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_from_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), exit::DATABASE))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), exit::MIGRATION))?;

        let seed_result = DemoSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), exit::SEED))?;

        let verification = DemoSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), exit::SEED))?;

        let run_result = if verification.all_present {
            Ok(seed_result.entities_seeded)
        } else {
            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(check.as_str()))
                .collect::<Vec<_>>();
            Err(("seed_verification", verification_message(&failed_checks), exit::SEED))
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(seeded) => CommandResult::success("seed", summary(&seeded)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn summary(seeded: &[EntitySeedInfo]) -> String {
    let ids = DemoSeedDataset::entity_ids();
    if seeded.is_empty() {
        return format!("demo dataset already present ({} entities)", ids.len());
    }

    let lines = seeded
        .iter()
        .map(|entity| {
            format!(
                "  - {}: {} in `{}` ({})",
                entity.workflow_type, entity.entity_id, entity.status, entity.description
            )
        })
        .collect::<Vec<_>>();
    format!("demo dataset loaded:\n{}", lines.join("\n"))
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "some seed data failed to load".to_string()
    } else {
        format!("seed verification failed for checks: {}", failed_checks.join(", "))
    }
}
