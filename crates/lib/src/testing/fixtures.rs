//! Fixture data sets.
//!
//! Ids that tests refer to are fixed; the rest are derived from a counter
//! so every call returns identical data.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::entry::{
    Collection, Entry, EntryHeader, EntryRef, EpicsValue, ID, Parameter, Readback, Root, Setpoint,
    Severity, Snapshot, Status,
};

/// Names accepted by [`Seed::Named`](super::Seed::Named).
pub const FIXTURE_NAMES: &[&str] = &[
    "linac_data",
    "linac_with_comparison_snapshot",
    "sample_database",
    "setpoint_with_readback",
    "parameter_with_readback",
    "simple_snapshot",
];

/// Looks up a fixture by name.
pub fn named(name: &str) -> Option<Root> {
    let root = match name {
        "linac_data" => linac_data(),
        "linac_with_comparison_snapshot" => linac_with_comparison_snapshot(),
        "sample_database" => sample_database(),
        "setpoint_with_readback" => Root::new(vec![setpoint_with_readback().into()]),
        "parameter_with_readback" => Root::new(vec![parameter_with_readback().into()]),
        "simple_snapshot" => Root::new(vec![simple_snapshot().into()]),
        _ => return None,
    };
    Some(root)
}

const fn id(value: u128) -> ID {
    ID::from_uuid(Uuid::from_u128(value))
}

pub const LASR_GUNB_PV1: ID = id(0x5544c58f_88b6_40aa_9076_f180a44908f5);
pub const LASR_GUNB_PV2: ID = id(0x7cb3760c_793c_4974_a8ae_778e5d491e4a);
pub const LASR_GUNB: ID = id(0xd5bade05_d992_4e44_87d8_0db2937209bf);
pub const MGNT_GUNB_PV: ID = id(0x930b137f_5ae2_470e_8b82_c4b4eb7e639e);
pub const MGNT_GUNB: ID = id(0x981d52d1_4d3c_4f85_89d7_8c04a0d588d0);
pub const VAC_GUNB_PV1: ID = id(0x8f3ac401_68f8_4def_b65a_3c8116c80ba7);
pub const VAC_GUNB_PV2: ID = id(0x06448272_cd38_4bb4_9b8d_292673a497e9);
pub const VAC_GUNB: ID = id(0xe09cf046_fbf6_4d37_9ee1_c3c2dd977798);
pub const GUNB: ID = id(0x6f09255f_3424_4fc2_bbd7_ae677c8a06b9);
pub const VAC_L0B_PV: ID = id(0x5ec33c74_7f4c_4905_a106_44fbfe138140);
pub const VAC_L0B: ID = id(0xaa11f29a_3e7e_4647_bfc9_133257647fb7);
pub const L0B: ID = id(0x5e84544b_4cfa_471c_b827_80063801d27b);
pub const LCLS_SC: ID = id(0x2f709b4b_79da_4a8b_8693_eed2c69c4d3c);
pub const LINAC_SNAPSHOT: ID = id(0x06282731_33ea_4270_ba14_098872e627dc);
pub const COMPARISON_SNAPSHOT: ID = id(0x8e0b1916_912a_457e_8ff9_4478b8018cec);

/// Hands out deterministic ids for entries no test names directly.
struct Ids(u128);

impl Ids {
    fn new(seed: u128) -> Self {
        Self(seed << 64)
    }

    fn next(&mut self) -> ID {
        self.0 += 1;
        id(self.0)
    }
}

/// 2024-01-01T00:00:00Z, the creation time of every fixture entry.
pub fn fixture_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_704_067_200, 0).unwrap_or_default()
}

fn header(uuid: ID, description: &str) -> EntryHeader {
    EntryHeader {
        uuid,
        description: description.to_string(),
        creation_time: fixture_time(),
        ..Default::default()
    }
}

fn parameter(uuid: ID, pv: &str, description: &str) -> Parameter {
    Parameter {
        header: header(uuid, description),
        ..Parameter::new(pv)
    }
}

fn collection(uuid: ID, title: &str, description: &str, children: Vec<Entry>) -> Collection {
    Collection {
        header: header(uuid, description),
        children: children.into_iter().map(EntryRef::from).collect(),
        ..Collection::new(title)
    }
}

fn setpoint_for(param: &Parameter, uuid: ID, data: impl Into<EpicsValue>) -> Setpoint {
    let mut setpoint = Setpoint::new(&param.pv_name, Some(data.into()));
    setpoint.header = header(uuid, &param.header.description);
    setpoint.status = Status::NoAlarm;
    setpoint.severity = Severity::NoAlarm;
    setpoint
}

/// Mirrors `coll` as a snapshot, taking each parameter's value from `value`.
fn snapshot_of(
    coll: &Collection,
    uuid: ID,
    ids: &mut Ids,
    value: &impl Fn(&str) -> EpicsValue,
) -> Snapshot {
    let mut snap = Snapshot::new(&coll.title);
    snap.header = header(uuid, &coll.header.description);
    snap.origin_collection = Some(coll.header.uuid);
    for child in coll.children.iter().filter_map(EntryRef::as_entry) {
        let captured = match child {
            Entry::Parameter(p) => Entry::from(setpoint_for(p, ids.next(), value(&p.pv_name))),
            Entry::Collection(c) => {
                let nested = ids.next();
                Entry::from(snapshot_of(c, nested, ids, value))
            }
            _ => continue,
        };
        snap.children.push(EntryRef::from(captured));
    }
    snap
}

fn lcls_sc() -> Collection {
    let gunb = collection(
        GUNB,
        "GUNB",
        "Injector sector for LCLS-SC",
        vec![
            collection(
                VAC_GUNB,
                "VAC",
                "VAC devices within GUNB",
                vec![
                    parameter(VAC_GUNB_PV1, "VAC:GUNB:TEST1", "First VAC pv in GUNB").into(),
                    parameter(VAC_GUNB_PV2, "VAC:GUNB:TEST2", "Second VAC pv in GUNB").into(),
                ],
            )
            .into(),
            collection(
                MGNT_GUNB,
                "MGNT",
                "MGNT devices within GUNB",
                vec![parameter(MGNT_GUNB_PV, "MGNT:GUNB:TEST0", "Only MGNT pv in GUNB").into()],
            )
            .into(),
            collection(
                LASR_GUNB,
                "LASR",
                "LASR devices within GUNB",
                vec![
                    parameter(LASR_GUNB_PV1, "LASR:GUNB:TEST1", "First LASR pv in GUNB").into(),
                    parameter(LASR_GUNB_PV2, "LASR:GUNB:TEST2", "Second LASR pv in GUNB").into(),
                ],
            )
            .into(),
        ],
    );
    let l0b = collection(
        L0B,
        "L0B",
        "First transport sector for LCLS-SC",
        vec![
            collection(
                VAC_L0B,
                "VAC",
                "VAC devices within L0B",
                vec![parameter(VAC_L0B_PV, "VAC:L0B:TEST0", "Only VAC pv in L0B").into()],
            )
            .into(),
        ],
    );
    collection(
        LCLS_SC,
        "LCLS-SC",
        "Superconducting linac",
        vec![gunb.into(), l0b.into()],
    )
}

fn standard_value(pv: &str) -> EpicsValue {
    match pv {
        "VAC:GUNB:TEST2" => EpicsValue::Bool(false),
        "LASR:GUNB:TEST1" | "LASR:GUNB:TEST2" => EpicsValue::Float(5.0),
        "MGNT:GUNB:TEST0" => EpicsValue::Int(1),
        _ => EpicsValue::Float(0.5),
    }
}

/// A collection hierarchy for one linac section and a snapshot of it.
///
/// `entries[0]` is the `LCLS-SC` collection; `entries[1]` is the standard
/// snapshot taken from it.
pub fn linac_data() -> Root {
    let coll = lcls_sc();
    let snapshot = snapshot_of(&coll, LINAC_SNAPSHOT, &mut Ids::new(1), &standard_value);
    Root::new(vec![coll.into(), snapshot.into()])
}

/// [`linac_data`] plus a second snapshot of the same collection, acquired
/// separately with different values and alarm states.
pub fn linac_with_comparison_snapshot() -> Root {
    let mut root = linac_data();
    let coll = lcls_sc();
    let comparison_value = |pv: &str| match pv {
        "VAC:GUNB:TEST2" => EpicsValue::Bool(true),
        "LASR:GUNB:TEST1" => EpicsValue::Float(-1.0),
        "VAC:L0B:TEST0" => EpicsValue::Int(-15),
        other => standard_value(other),
    };
    let mut snapshot = snapshot_of(
        &coll,
        COMPARISON_SNAPSHOT,
        &mut Ids::new(2),
        &comparison_value,
    );
    snapshot.title = "AD Comparison".to_string();
    snapshot.header.description =
        "A snapshot with different values and statuses to compare to the standard snapshot"
            .to_string();

    // Degrade the alarm state of two readings
    let degraded = [
        ("LASR:GUNB:TEST1", Severity::Major),
        ("VAC:L0B:TEST0", Severity::Minor),
    ];
    let mut stack: Vec<&mut EntryRef> = snapshot.children.iter_mut().collect();
    while let Some(slot) = stack.pop() {
        match EntryRef::as_entry_mut(slot) {
            Some(Entry::Setpoint(s)) => {
                if let Some((_, severity)) = degraded.iter().find(|(pv, _)| *pv == s.pv_name) {
                    s.severity = *severity;
                }
            }
            Some(Entry::Snapshot(nested)) => stack.extend(nested.children.iter_mut()),
            _ => {}
        }
    }

    root.entries.push(snapshot.into());
    root
}

/// A setpoint paired with its own readback.
pub fn setpoint_with_readback() -> Setpoint {
    let mut readback = Readback::new("RBV", Some(false.into()));
    readback.header = header(id(0x7b30ddba_9fae_4691_988c_07384c29fe22), "A readback PV");

    let mut setpoint = Setpoint::new("SET", Some(true.into()));
    setpoint.header = header(id(0x418ed1ab_f1cf_4188_8f4c_ae7cbaf00e6c), "A setpoint PV");
    setpoint.readback = Some(EntryRef::from(Entry::from(readback)));
    setpoint
}

/// A parameter paired with a readback parameter.
pub fn parameter_with_readback() -> Parameter {
    let readback = parameter(
        id(0x64772c61_c117_445b_b0c8_4c17fd1625d9),
        "RBV",
        "A readback PV",
    );
    let mut setpoint = parameter(
        id(0xb508344d_1fe9_473b_8d43_9499d0e8e23f),
        "SET",
        "A setpoint PV",
    );
    setpoint.readback = Some(EntryRef::from(Entry::from(readback)));
    setpoint
}

/// A snapshot holding setpoints of several value types.
pub fn simple_snapshot() -> Snapshot {
    let mut ids = Ids::new(4);
    let mut snap = Snapshot::new("types collection");
    snap.header = header(ids.next(), "various types");
    for (pv, data) in [
        ("MY:FLOAT", EpicsValue::Float(1.5)),
        ("MY:INT", EpicsValue::Int(3)),
        ("MY:ENUM", EpicsValue::from("ON")),
    ] {
        let mut setpoint = Setpoint::new(pv, Some(data));
        setpoint.header = header(ids.next(), "");
        snap.children.push(EntryRef::from(Entry::from(setpoint)));
    }
    snap
}

/// A small database covering every entry type, modelled on a motor record.
pub fn sample_database() -> Root {
    let mut ids = Ids::new(3);
    let param = parameter(ids.next(), "MY:MOTOR:mtr1.ACCL", "parameter 1 in root");
    let value = setpoint_for(&param, ids.next(), 2);

    let mut coll = collection(
        ids.next(),
        "collection 1",
        "collection 1 defining some motor fields",
        Vec::new(),
    );
    let mut snap = Snapshot::new("snapshot 1");
    snap.header = header(ids.next(), "Snapshot 1 created from collection 1");
    snap.origin_collection = Some(coll.header.uuid);

    for (field, data) in [("ACCL", 2), ("VELO", 2), ("PREC", 6)] {
        let sub_param = parameter(
            ids.next(),
            &format!("MY:PREFIX:mtr1.{field}"),
            &format!("motor field {field}"),
        );
        let sub_value = setpoint_for(&sub_param, ids.next(), data);
        coll.children.push(EntryRef::from(Entry::from(sub_param)));
        snap.children.push(EntryRef::from(Entry::from(sub_value)));
    }

    Root::new(vec![param.into(), value.into(), coll.into(), snap.into()])
}
