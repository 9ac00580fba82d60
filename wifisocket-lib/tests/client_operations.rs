mod common;

use chrono::NaiveTime;
use common::*;
use wifisocket_lib::absence::parse_absence_time;
use wifisocket_lib::frame;
use wifisocket_lib::timer::{TimerSchedule, local_time_of_day};
use wifisocket_lib::{RepeatMask, SwitchState, TimerSelector, TimerSlotId, WsError};

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

#[tokio::test]
async fn test_switch_then_query_state() {
    let client = client();
    let device = device_a();

    client.switch(&device, SwitchState::On).await.unwrap();
    assert_eq!(client.switch_state(&device).await.unwrap(), SwitchState::On);

    // Switching to the current state changes nothing
    client.switch(&device, SwitchState::On).await.unwrap();
    assert_eq!(client.switch_state(&device).await.unwrap(), SwitchState::On);

    client.switch(&device, SwitchState::Off).await.unwrap();
    assert_eq!(client.switch_state(&device).await.unwrap(), SwitchState::Off);

    // Only the addressed socket was touched
    assert_eq!(client.transport().socket(MAC_B).state, SwitchState::Off);
}

#[tokio::test]
async fn test_switch_frame_on_the_wire() {
    let client = client();
    client.switch(&device_a(), SwitchState::On).await.unwrap();

    let frames = client.transport().frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(hex::encode(&frames[0][..9]), "0140accf2300000110");

    let request = frame::decode_request(&frames[0]).unwrap();
    assert_eq!(request.mac, MAC_A);
    assert_eq!(request.packet_seq, 0xFFFF);
    assert_eq!(hex::encode(request.device_code), "c1117150");
    assert_eq!(hex::encode(&request.body), "010000ffff");
}

#[tokio::test]
async fn test_timer_roundtrip() {
    let client = client();
    let device = device_a();

    client
        .set_timer(
            &device,
            TimerSlotId::Regular(3),
            true,
            "1111100".parse().unwrap(),
            hm(7, 30),
            SwitchState::On,
        )
        .await
        .unwrap();

    let slot = client.query_timer(&device, TimerSlotId::Regular(3)).await.unwrap();
    assert_eq!(
        slot.schedule,
        Some(TimerSchedule {
            active: true,
            repeat: RepeatMask::WEEKDAYS,
            time: hm(7, 30),
            action: SwitchState::On,
        })
    );
    assert_eq!(
        slot.to_string(),
        "Timer(number=3, active=true, repeat=1111100, time=07:30, switch=on)"
    );
}

#[tokio::test]
async fn test_time_delta_shifts_stored_time() {
    let client = client().with_time_delta(chrono::TimeDelta::seconds(-7200));
    let device = device_a();

    client
        .set_timer(&device, TimerSlotId::Regular(1), true, RepeatMask::DAILY, hm(1, 0), SwitchState::Off)
        .await
        .unwrap();

    // Two hours east of UTC: 01:00 local is 23:00 on the socket
    let record = client.transport().socket(MAC_A).timers[0];
    assert_eq!(record[2..4], [23, 0]);

    let slot = client.query_timer(&device, TimerSlotId::Regular(1)).await.unwrap();
    assert_eq!(slot.schedule.unwrap().time, hm(1, 0));
}

#[tokio::test]
async fn test_delete_timer_frees_slot() {
    let client = client();
    let device = device_a();

    client
        .set_timer(&device, TimerSlotId::Regular(4), false, RepeatMask::NEVER, hm(18, 0), SwitchState::Off)
        .await
        .unwrap();
    let set = client.query_timers(&device, TimerSelector::Set).await.unwrap();
    assert_eq!(set.len(), 1);
    assert!(client.query_timers(&device, TimerSelector::Active).await.unwrap().is_empty());

    client.delete_timer(&device, TimerSlotId::Regular(4)).await.unwrap();

    let free = client.free_timer_slots(&device).await.unwrap();
    assert!(free.contains(&TimerSlotId::Regular(4)));
    assert_eq!(free.len(), 11);
    assert!(client.query_timers(&device, TimerSelector::Set).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_out_of_range_slot_is_never_sent() {
    let client = client();
    let device = device_a();

    let result = client.delete_timer(&device, TimerSlotId::Regular(11)).await;
    assert!(matches!(result, Err(WsError::InvalidInput(_))));
    let result = client
        .set_timer(&device, TimerSlotId::Regular(0), true, RepeatMask::NEVER, hm(8, 0), SwitchState::On)
        .await;
    assert!(matches!(result, Err(WsError::InvalidInput(_))));
    assert_eq!(client.transport().sent(), 0);
}

#[tokio::test]
async fn test_activate_timer_keeps_schedule() {
    let client = client();
    let device = device_a();

    client
        .set_timer(&device, TimerSlotId::Regular(2), true, RepeatMask::WEEKDAYS, hm(6, 45), SwitchState::On)
        .await
        .unwrap();
    client
        .activate_timer(&device, TimerSlotId::Regular(2), false)
        .await
        .unwrap();

    let schedule = client
        .query_timer(&device, TimerSlotId::Regular(2))
        .await
        .unwrap()
        .schedule
        .unwrap();
    assert!(!schedule.active);
    assert_eq!(schedule.repeat, RepeatMask::WEEKDAYS);
    assert_eq!(schedule.time, hm(6, 45));
    assert_eq!(schedule.action, SwitchState::On);
}

#[tokio::test]
async fn test_activate_timer_rejects_empty_and_countdown() {
    let client = client();
    let device = device_a();

    let result = client.activate_timer(&device, TimerSlotId::Regular(5), true).await;
    assert!(matches!(result, Err(WsError::InvalidInput(_))));
    assert_eq!(client.transport().sent(), 1);

    let result = client.activate_timer(&device, TimerSlotId::Countdown, true).await;
    assert!(matches!(result, Err(WsError::InvalidInput(_))));
    assert_eq!(client.transport().sent(), 1);
}

#[tokio::test]
async fn test_countdown_reports_remaining_time() {
    let client = client();
    let device = device_a();

    client.set_countdown(&device, hm(1, 30), SwitchState::Off).await.unwrap();
    let record = client.transport().socket(MAC_A).timers[10];
    assert_eq!(record[1], 0x80);

    let schedule = client
        .query_timer(&device, TimerSlotId::Countdown)
        .await
        .unwrap()
        .schedule
        .unwrap();
    assert!(schedule.active);
    assert_eq!(schedule.action, SwitchState::Off);
    // The minute may roll over between setting and reading
    assert!(
        schedule.time == hm(1, 30) || schedule.time == hm(1, 29),
        "remaining {} at {}",
        schedule.time,
        local_time_of_day()
    );
}

#[tokio::test]
async fn test_absence_roundtrip() {
    let client = client();
    let device = device_b();
    let from = parse_absence_time("20.01.2030 22:00").unwrap();
    let to = parse_absence_time("27.01.2030 06:30").unwrap();

    client.set_absence(&device, true, &from, &to).await.unwrap();
    let window = client.query_absence(&device).await.unwrap();
    assert!(window.active);
    assert_eq!(window.from, Some(from));
    assert_eq!(window.to, Some(to));

    client.delete_absence(&device).await.unwrap();
    let window = client.query_absence(&device).await.unwrap();
    assert!(!window.active);
    assert_eq!(window.from, None);
}

#[tokio::test]
async fn test_heartbeat_and_slave() {
    let client = client();
    client.heartbeat(&device_a()).await.unwrap();
    client
        .switch_slave(&device_a(), [0x78, 0xFB, 0x12], SwitchState::On)
        .await
        .unwrap();

    let request = frame::decode_request(&client.transport().frames()[1]).unwrap();
    assert_eq!(hex::encode(&request.body), "0878fb1260");
}
