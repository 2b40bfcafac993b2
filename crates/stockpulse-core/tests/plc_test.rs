// PLC client scenarios against the in-memory simulator.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use stockpulse_core::plc::PlcEndpoint;
use stockpulse_core::{
    MemoryInventory, NodeAddresses, PlcClient, PlcConfig, PlcError, PlcPanel, PlcValue, Product,
    SimulatedPlc,
};

fn client(sim: &SimulatedPlc) -> PlcClient {
    PlcClient::new(
        PlcEndpoint {
            url: "opc.tcp://plc.local:4840".into(),
            username: Some("operator".into()),
            password: None,
        },
        Arc::new(sim.clone()),
        3,
        Duration::from_secs(2),
    )
}

#[tokio::test(start_paused = true)]
async fn unreachable_plc_write_reports_unavailable() {
    let sim = SimulatedPlc::unreachable();
    let plc = client(&sim);

    let err = plc
        .write_node("ns=2;s=ItemCount", PlcValue::Int(10))
        .await
        .unwrap_err();

    assert!(matches!(err, PlcError::Unavailable { attempts: 3, .. }));
    assert_eq!(
        err.to_string(),
        "Cannot connect to PLC at opc.tcp://plc.local:4840 after 3 attempts"
    );
    assert_eq!(sim.dial_count(), 3);
    assert!(!plc.is_connected().await);
    assert_eq!(sim.peek("ns=2;s=ItemCount"), Some(PlcValue::Int(0)));
}

#[tokio::test(start_paused = true)]
async fn plc_coming_back_is_picked_up_by_the_next_call() {
    let sim = SimulatedPlc::unreachable();
    let plc = client(&sim);

    assert!(!plc.probe().await);
    sim.set_reachable(true);
    assert!(plc.probe().await);
    assert_eq!(sim.dial_count(), 4);

    plc.write_node("ns=2;s=ItemCount", PlcValue::Int(10)).await.unwrap();
    assert_eq!(sim.peek("ns=2;s=ItemCount"), Some(PlcValue::Int(10)));
    assert_eq!(sim.dial_count(), 4);
}

#[tokio::test]
async fn concurrent_callers_share_one_dial() {
    let sim = SimulatedPlc::new();
    let plc = client(&sim);

    let tasks: Vec<_> = (0..10)
        .map(|i| {
            let plc = plc.clone();
            tokio::spawn(async move { plc.write_node("ns=2;s=ItemCount", PlcValue::Int(i)).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(sim.dial_count(), 1);
}

#[tokio::test]
async fn panel_sync_from_catalog() {
    let sim = SimulatedPlc::new();
    let panel = PlcPanel::new(
        client(&sim),
        NodeAddresses::default(),
        PlcConfig::default().hmi_commands,
    );
    let store = MemoryInventory::with_products([
        Product {
            id: 1,
            name: "Gloves".into(),
            category_id: Some(5),
            quantity: 30,
            rfid_tag: Some("G1".into()),
        },
        Product {
            id: 2,
            name: "Tape".into(),
            category_id: None,
            quantity: 8,
            rfid_tag: None,
        },
    ]);

    let synced = panel.sync_inventory(&store).await.unwrap();
    assert_eq!(synced.total_quantity, 38);
    assert_eq!(synced.category_data, "5:1");
    assert_eq!(sim.peek("ns=2;s=ItemCount"), Some(PlcValue::Int(38)));

    panel.send_hmi_command("EMERGENCY_STOP").await.unwrap();
    assert_eq!(sim.peek("ns=2;s=HMICommand"), Some(PlcValue::from("EMERGENCY_STOP")));
}
