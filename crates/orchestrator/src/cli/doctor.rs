use sage_domain::config::{Config, ConfigSeverity};

/// Run all diagnostic checks and print a summary.
///
/// Returns `Ok(true)` when every check passes, `Ok(false)` when at least
/// one check failed.
pub async fn run(config: &Config, config_path: &str) -> anyhow::Result<bool> {
    println!("sage doctor");
    println!("===========\n");

    let mut all_passed = true;

    // 1. Config file
    check_config_file(config_path, &mut all_passed);

    // 2. Config validation
    check_config_validation(config, &mut all_passed);

    // 3. Data directory
    check_data_dir(config, &mut all_passed);

    // 4. Model endpoint
    check_model_endpoint(config, &mut all_passed).await;

    // 5. API key
    check_api_key(config, &mut all_passed);

    // Summary
    println!();
    if all_passed {
        println!("All checks passed.");
    } else {
        println!("Some checks failed. Review the output above.");
    }

    Ok(all_passed)
}

// ── Individual checks ─────────────────────────────────────────────────

fn check_config_file(config_path: &str, all_passed: &mut bool) {
    let exists = std::path::Path::new(config_path).exists();
    print_check(
        "Config file exists",
        exists,
        if exists {
            config_path.to_owned()
        } else {
            format!("{config_path} not found (using defaults)")
        },
    );
    if !exists {
        *all_passed = false;
    }
}

fn check_config_validation(config: &Config, all_passed: &mut bool) {
    let issues = config.validate();
    let error_count = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();

    if issues.is_empty() {
        print_check("Config validation", true, "no issues".into());
    } else {
        print_check(
            "Config validation",
            error_count == 0,
            format!("{} issue(s) ({} error(s))", issues.len(), error_count),
        );
        for issue in &issues {
            println!("      {issue}");
        }
        if error_count > 0 {
            *all_passed = false;
        }
    }
}

fn check_data_dir(config: &Config, all_passed: &mut bool) {
    let path = &config.store.data_dir;
    let writable = std::fs::create_dir_all(path).is_ok() && {
        // Try creating a temp file to verify write access.
        let probe = path.join(".sage_doctor_probe");
        let w = std::fs::write(&probe, b"probe").is_ok();
        let _ = std::fs::remove_file(&probe);
        w
    };

    print_check(
        "Data directory writable",
        writable,
        if writable {
            format!("{}", path.display())
        } else {
            format!("{} (not writable)", path.display())
        },
    );
    if !writable {
        *all_passed = false;
    }
}

async fn check_model_endpoint(config: &Config, all_passed: &mut bool) {
    let url = &config.model.base_url;
    if url.is_empty() {
        print_check(
            "Model endpoint",
            true,
            "not configured (templated replies only)".into(),
        );
        return;
    }

    let reachable = match reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
    {
        Ok(client) => client.get(url).send().await.is_ok(),
        Err(_) => false,
    };

    print_check(
        "Model endpoint reachable",
        reachable,
        if reachable {
            url.clone()
        } else {
            format!("{url} (unreachable)")
        },
    );
    if !reachable {
        *all_passed = false;
    }
}

fn check_api_key(config: &Config, _all_passed: &mut bool) {
    let env = &config.model.api_key_env;
    if config.model.base_url.is_empty() {
        print_check("API key", true, format!("{env} not needed (no endpoint)"));
        return;
    }

    // An unset key is valid for local endpoints, so it never fails the
    // run; the detail line is the hint.
    let present = std::env::var(env).map(|v| !v.is_empty()).unwrap_or(false);
    print_check(
        "API key",
        true,
        if present {
            format!("{env} set")
        } else {
            format!("{env} not set (requests go out unauthenticated)")
        },
    );
}

// ── Formatting helper ─────────────────────────────────────────────────

fn print_check(name: &str, passed: bool, detail: String) {
    let status = if passed { "PASS" } else { "FAIL" };
    println!("  [{status}] {name}: {detail}");
}
