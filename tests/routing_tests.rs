/// Routing decision properties exercised through the public API
use smart_proxy::config::{
    discover_pattern_files, merge_patterns, AppConfig, ModeConfig,
};
use smart_proxy::mode::ModeController;
use smart_proxy::rules::{RouteDecision, RuleSet};
use std::sync::Arc;

fn build_rules(config: &AppConfig) -> (Arc<ModeController>, RuleSet) {
    let controller = Arc::new(
        ModeController::new(
            config.mode_names(),
            config.key_map(),
            &config.proxy.default_mode,
        )
        .unwrap(),
    );
    let rules = RuleSet::new(
        config.block_patterns(),
        config.allow_patterns(),
        config.mode_patterns(),
        controller.clone(),
    );
    (controller, rules)
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.blocklist = vec!["*.brave.com".to_string(), "brave.com".to_string()];
    config.whitelist = vec!["*.always-proxied.net".to_string()];
    config
        .modes
        .get_mut("fun")
        .unwrap()
        .patterns
        .push("*.youtube.com".to_string());
    config
}

#[test]
fn test_blocked_hosts_are_blocked_in_every_mode() {
    let config = test_config();
    let (controller, rules) = build_rules(&config);

    for mode in controller.known_modes().to_vec() {
        controller.switch_to(&mode);
        assert_eq!(rules.decide("sync.brave.com"), RouteDecision::Blocked);
        assert_eq!(rules.decide("sync.brave.com:443"), RouteDecision::Blocked);
        assert_eq!(rules.decide("brave.com"), RouteDecision::Blocked);
    }
}

#[test]
fn test_whitelisted_hosts_are_proxied_in_every_mode() {
    let config = test_config();
    let (controller, rules) = build_rules(&config);

    for mode in controller.known_modes().to_vec() {
        controller.switch_to(&mode);
        assert_eq!(
            rules.decide("cdn.always-proxied.net"),
            RouteDecision::Proxied
        );
    }
}

#[test]
fn test_block_wins_over_whitelist() {
    let mut config = test_config();
    config.whitelist.push("*.brave.com".to_string());
    let (_controller, rules) = build_rules(&config);

    assert_eq!(rules.decide("sync.brave.com"), RouteDecision::Blocked);
}

#[test]
fn test_mode_patterns_apply_only_in_their_mode() {
    let config = test_config();
    let (controller, rules) = build_rules(&config);

    controller.switch_to("fun");
    assert_eq!(rules.decide("www.youtube.com"), RouteDecision::Proxied);

    for other in ["down", "work", "WORK", "FUN"] {
        controller.switch_to(other);
        assert_eq!(
            rules.decide("www.youtube.com"),
            RouteDecision::Direct,
            "mode {} should not proxy youtube",
            other
        );
    }
}

#[test]
fn test_unmatched_hosts_go_direct() {
    let config = test_config();
    let (_controller, rules) = build_rules(&config);
    assert_eq!(rules.decide("example.org"), RouteDecision::Direct);
    assert_eq!(rules.decide(""), RouteDecision::Direct);
}

#[test]
fn test_decisions_follow_live_mode_switches() {
    let config = test_config();
    let (controller, rules) = build_rules(&config);

    assert_eq!(rules.decide("www.youtube.com"), RouteDecision::Direct);
    controller.switch_to("fun");
    assert_eq!(rules.decide("www.youtube.com"), RouteDecision::Proxied);
    controller.switch_to("work");
    assert_eq!(rules.decide("www.youtube.com"), RouteDecision::Direct);
}

#[test]
fn test_concurrent_decisions_during_switches() {
    let mut config = test_config();
    config.modes.insert(
        "video".to_string(),
        ModeConfig {
            key: Some("v".to_string()),
            patterns: vec!["*.youtube.com".to_string()],
        },
    );
    let (controller, rules) = build_rules(&config);
    let rules = Arc::new(rules);

    let mut workers = Vec::new();
    for _ in 0..4 {
        let rules = rules.clone();
        workers.push(std::thread::spawn(move || {
            for _ in 0..500 {
                // 决策只能是三态之一，阻断规则在任何模式下都成立
                assert_eq!(rules.decide("sync.brave.com"), RouteDecision::Blocked);
                let decision = rules.decide("www.youtube.com");
                assert!(
                    decision == RouteDecision::Proxied || decision == RouteDecision::Direct
                );
            }
        }));
    }

    let switcher = std::thread::spawn(move || {
        for i in 0..500 {
            controller.switch_to(if i % 2 == 0 { "fun" } else { "work" });
        }
    });

    for worker in workers {
        worker.join().unwrap();
    }
    switcher.join().unwrap();
}

#[test]
fn test_whitelist_files_replace_configured_whitelist() {
    let dir = std::env::temp_dir().join(format!(
        "smart-proxy-routing-{}",
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("media.whitelist"),
        "*.youtube.com # video\n*.ytimg.com\n",
    )
    .unwrap();

    let files = discover_pattern_files(&dir).unwrap();
    let merged = merge_patterns(&files);
    assert_eq!(merged, vec!["*.youtube.com", "*.ytimg.com"]);

    let mut config = test_config();
    config.whitelist = merged;
    let (_controller, rules) = build_rules(&config);

    // 文件中的条目成为全局白名单，在默认 work 模式下即生效
    assert_eq!(rules.decide("i.ytimg.com"), RouteDecision::Proxied);
    assert_eq!(
        rules.decide("cdn.always-proxied.net"),
        RouteDecision::Direct,
        "the configured whitelist was replaced wholesale"
    );

    let _ = std::fs::remove_dir_all(&dir);
}
