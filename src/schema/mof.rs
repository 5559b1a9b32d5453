//! Classic (MOF) kernel event classes
//!
//! Classic events carry no event ID of their own. They are identified by their class GUID and
//! opcode, so a stable ID is computed as `base_id + opcode`. Opcodes are 8-bit, so the base IDs
//! are 255 apart and IDs of different classes never overlap.
use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::guid::Guid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MofClass {
    pub name: &'static str,
    pub base_id: u16,
}

/// Keyed on the `data1` field of the class GUID
static MOF_CLASSES: Lazy<HashMap<u32, MofClass>> = Lazy::new(|| {
    [
        // 45d8cccd-539f-4b72-a8b7-5c683142609a
        (1171836109, "ALPC", 0),
        // 78d14f17-0105-46d7-bfff-6fbea2f3f358
        (2026983191, "ApplicationVerifier", 255),
        // 13976d09-a327-438c-950b-7f03192815c7
        (328690953, "DbgPrint", 510),
        // 3d6fa8d4-fe05-11d0-9dda-00c04fd7ba7c
        (1030727892, "DiskIo", 765),
        // bdd865d1-d7c1-11d0-a501-00a0c9062910
        (3185075665, "DiskPerf", 1020),
        // d56ca431-61bf-4904-a621-00e0381e4dde
        (3580666929, "DriverVerifier", 1275),
        // b16f9f5e-b3da-4027-9318-adf2b79df73b
        (2976882526, "EventLog", 1530),
        // 01853a65-418f-4f36-aefc-dc0f1d2fd235
        (25508453, "EventTraceConfig", 1785),
        // 90cbdc39-4a3e-11d1-84f4-0000f80464e3
        (2429279289, "FileIo", 2040),
        // 8d40301f-ab4a-11d2-9a93-00805f85d7c6
        (2369794079, "GenericMessage", 2295),
        // e8908abc-aa84-11d2-9a93-00805f85d7c6
        (3901786812, "GlobalLogger", 2550),
        // 3d6fa8d2-fe05-11d0-9dda-00c04fd7ba7c
        (1030727890, "HardFault", 2805),
        // 2cb15d1d-5fc1-11d2-abe1-00a0c911f518
        (749821213, "ImageLoad", 3060),
        // 98a2b9d7-94dd-496a-847e-67a5557a59f2
        (2560801239, "MsSystemInformation", 3315),
        // 3d6fa8d3-fe05-11d0-9dda-00c04fd7ba7c
        (1030727891, "PageFault", 3570),
        // ce1dbfb4-137e-4da6-87b0-3f59aa102cbc
        (3458056116, "PerfInfo", 3825),
        // 3d6fa8d0-fe05-11d0-9dda-00c04fd7ba7c
        (1030727888, "Process", 4080),
        // ae53722e-c863-11d2-8659-00c04fa321a1
        (2924704302, "Registry", 4335),
        // d837ca92-12b9-44a5-ad6a-3a65b3578aa8
        (3627534994, "SplitIo", 4590),
        // 9a280ac0-c8e0-11d1-84e2-00c04fb998a2
        (2586315456, "TcpIp", 4845),
        // a1bc18c0-a7c8-11d1-bf3c-00a0c9062910
        (2713458880, "ThermalZone", 5100),
        // 3d6fa8d1-fe05-11d0-9dda-00c04fd7ba7c
        (1030727889, "Thread", 5355),
        // 398191dc-2da7-11d3-8b98-00805f85d7c6
        (964792796, "TraceError", 5610),
        // bf3a50c5-a9c9-4988-a005-2df0b7c80f80
        (3208270021, "UdpIp", 5865),
        // 44608a51-1851-4456-98b2-b300e931ee41
        (1147177553, "WmiEventLogger", 6120),
        // 68fdd900-4a3e-11d1-84f4-0000f80464e3
        (0x68fdd900, "EventTraceEvent", 6375),
    ]
    .into_iter()
    .map(|(data1, name, base_id)| (data1, MofClass { name, base_id }))
    .collect()
});

/// The known class a classic event GUID belongs to
pub fn class_of(event_guid: &Guid) -> Option<MofClass> {
    MOF_CLASSES.get(&event_guid.data1).copied()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_known_classes() {
        let process = Guid::parse("3d6fa8d0-fe05-11d0-9dda-00c04fd7ba7c").unwrap();
        assert_eq!(
            class_of(&process),
            Some(MofClass {
                name: "Process",
                base_id: 4080
            })
        );

        let event_trace = Guid::parse("68fdd900-4a3e-11d1-84f4-0000f80464e3").unwrap();
        assert_eq!(class_of(&event_trace).map(|c| c.name), Some("EventTraceEvent"));

        assert_eq!(class_of(&Guid::zeroed()), None);
    }
}
