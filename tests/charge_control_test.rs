use darwin_bclm::charge::{decide, ChargeState, Decision, Thresholds, CHARGE_KEY_FAMILIES};
use darwin_bclm::daemon::LaunchDaemon;
use darwin_bclm::power::{parse_pmset_output, PowerSource};

#[test]
fn test_pmset_report_drives_decision() {
    let report = "Now drawing from 'AC Power'\n -InternalBattery-0 (id=4653155)\t82%; charging; 0:20 remaining present: true\n";
    let status = parse_pmset_output(report);
    let thresholds = Thresholds::new(80).unwrap();

    let decision = decide(&thresholds, status.percentage, status.on_ac(), Some(ChargeState::Enabled));
    assert_eq!(decision, Decision::Disable);
    assert_eq!(decision.desired_state(), Some(ChargeState::Disabled));
}

#[test]
fn test_battery_report_below_target_is_report_only() {
    let report = "Now drawing from 'Battery Power'\n -InternalBattery-0 (id=4653155)\t40%; discharging; 5:10 remaining present: true\n";
    let status = parse_pmset_output(report);
    assert_eq!(status.source, PowerSource::Battery);

    let decision = decide(&Thresholds::default(), status.percentage, status.on_ac(), Some(ChargeState::Disabled));
    assert_eq!(decision, Decision::OffAc);
}

#[test]
fn test_band_follows_target() {
    for target in [20u8, 50, 80, 100] {
        let thresholds = Thresholds::new(target).unwrap();
        assert_eq!(thresholds.upper() - thresholds.lower(), 5);
        assert_eq!(decide(&thresholds, Some(target), true, None), Decision::Disable);
        assert_eq!(decide(&thresholds, Some(target - 5), true, None), Decision::Hold);
        assert_eq!(decide(&thresholds, Some(target - 6), true, None), Decision::Enable);
    }
}

#[test]
fn test_key_families_are_ordered() {
    let keys: Vec<String> = CHARGE_KEY_FAMILIES.iter().map(|f| f.key.to_string()).collect();
    assert_eq!(keys, ["CHTE", "CH0B"]);
}

#[test]
fn test_persist_descriptor_schedules_once_mode() {
    let plist = LaunchDaemon::new(Thresholds::new(75).unwrap()).render();
    assert!(plist.contains("<string>maintain</string>"));
    assert!(plist.contains("<string>75</string>"));
    assert!(plist.contains("<string>--once</string>"));
    assert!(plist.contains("<integer>60</integer>"));
}
