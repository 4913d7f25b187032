// ABOUTME: List command: configured site identifiers in file order.
// ABOUTME: Normal mode adds each site's resolved execution target.

use stagehand::config::{HostOverride, SitesConfig};
use stagehand::output::{Output, OutputMode};

pub fn list(config: &SitesConfig, overrides: &HostOverride, output: &Output) {
    if output.mode() != OutputMode::Normal {
        output.sites(&config.site_names());
        return;
    }

    let width = config
        .site_names()
        .iter()
        .map(|n| n.len())
        .max()
        .unwrap_or(0);
    for site in config.sites() {
        println!(
            "{:<width$}  {}  {}",
            site.name.as_str(),
            site.target_label(overrides),
            site.deploy_path
        );
    }
}
