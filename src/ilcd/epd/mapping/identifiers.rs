//! Well-known ILCD reference dataset UUIDs and their openEPD names.

/// LCIA method datasets to openEPD impact names.
pub const IMPACTS: &[(&str, &str)] = &[
    ("77e416eb-a363-4258-a04e-171d843a6460", "gwp"),
    ("6a37f984-a4b3-458a-a20a-64418c145fa2", "gwp"),
    ("5f635281-343e-44fb-83df-1971b155e6b6", "gwp-fossil"),
    ("2356e1ab-0185-4db5-86e5-16de51c7485c", "gwp-biogenic"),
    ("4331bbdb-978a-490d-8707-eeb047f01a55", "gwp-luluc"),
    ("06dcd26f-025f-401a-a7c1-5e457eb54637", "odp"),
    ("1e84a202-dae6-42aa-9e9d-71ea48b8be00", "pocp"),
    ("b5c611c6-def3-11e6-bf01-fe55135034f3", "ap"),
    ("b4274add-93b7-4905-a5e4-2e878c4e4216", "ap"),
    ("b53ec18f-7377-4ad3-86eb-cc3f4f276b2b", "ep-fresh"),
    ("f58827d0-b407-4ec6-be75-8b69efb98a0f", "ep-fresh"),
    ("b5c619fa-def3-11e6-bf01-fe55135034f3", "ep-marine"),
    ("b5c614d2-def3-11e6-bf01-fe55135034f3", "ep-terr"),
    ("b2ad66ce-c78d-11e6-9d9d-cec0c932ce01", "WDP"),
];

/// Input flow datasets to openEPD resource use names.
pub const RESOURCE_USES: &[(&str, &str)] = &[
    ("3cf952c8-f3a4-461d-8c96-96456ca62246", "fw"),
    ("ac857178-2b45-46ec-892a-a9a4332f0372", "penre"),
    ("1421caa0-679d-4bf4-b282-0eb850ccae27", "penrm"),
    ("89def144-d39a-4287-b86f-efde453ddcb2", "nrsf"),
    ("20f32be5-0398-4288-9b6d-accddd195317", "pere"),
    ("fb3ec0de-548d-4508-aea5-00b73bf6f702", "perm"),
    ("64333088-a55f-4aa2-9a31-c10b07816787", "rsf"),
    ("c6a1f35f-2d09-4f54-8dfb-97e502e1ce92", "sm"),
    ("06159210-646b-4c8d-8583-da9b3b95a6c1", "penrt"),
    ("53f97275-fa8a-4cdd-9024-65936002acd0", "pert"),
];

/// Output flow datasets to openEPD output flow names.
pub const OUTPUT_FLOWS: &[(&str, &str)] = &[
    ("a2b32f97-3fc7-4af2-b209-525bc6426f33", "cru"),
    ("4da0c987-2b76-40d6-9e9e-82a017aaaf29", "ee"),
    ("98daf38a-7a79-46d3-9a37-2b7bd0955810", "eh"),
    ("430f9e0f-59b2-46a0-8e0d-55e0e84948fc", "hwd"),
    ("59a9181c-3aaf-46ee-8b13-2b3723b6e447", "mer"),
    ("d7fe48a5-4103-49c8-9aae-b0b5dfdbd6ae", "mfr"),
    ("b29ef66b-e286-4afa-949f-62f1a7b4d7fa", "nhwd"),
    ("3449546e-52ad-4b39-b809-9fb77cea8ff6", "rwd"),
];

/// Unit group datasets to unit symbols.
pub const UNIT_GROUPS: &[(&str, &str)] = &[
    ("c20a03d7-bd90-4569-bc94-66cfd364dfc8", "m2"),
    ("93a60a57-a3c8-11da-a746-0800200c9a66", "MJ"),
    ("6ae2df01-888e-46c8-b17d-49fa3869b476", "m3AWARE"),
    ("1ebf3012-d0db-4de2-aefd-ef30cedb0be1", "kgCO2e"),
    ("b5c629d6-def3-11e6-bf01-fe55135034f3", "kgCFC11e"),
    ("88054749-b0a6-47ea-a82b-dc5b29326512", "kgCFC11e"),
    ("b5c611c6-def3-11e6-bf01-fe55135034f3", "kgSO2e"),
    ("01c26c17-9a76-406e-8295-f17b55fd909e", "kgC2H4e"),
    ("67b5401d-873c-485f-bcf3-6ae83b918822", "kgPO4e"),
    ("b4274add-93b7-4905-a5e4-2e878c4e4216", "kgSO2e"),
    ("bc50c624-a9bc-45b1-a9b0-e6b10d00476f", "kgSO2e"),
];

/// Flow property datasets to property names.
pub const FLOW_PROPERTIES: &[(&str, &str)] = &[
    ("7e18d0ad-e78e-47a0-8e96-1c0a581902e2", "mass"),
    ("838aaa23-0117-11db-92e3-0800200c9a66", "length"),
];

/// Looks up a UUID, ignoring case and surrounding whitespace.
pub fn lookup(table: &[(&str, &'static str)], uuid: &str) -> Option<&'static str> {
    let uuid = uuid.trim();
    table
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(uuid))
        .map(|(_, name)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_ignore_case() {
        assert_eq!(
            lookup(IMPACTS, " 77E416EB-A363-4258-A04E-171D843A6460 "),
            Some("gwp")
        );
        assert_eq!(lookup(FLOW_PROPERTIES, "unknown"), None);
    }

    #[test]
    fn tables_have_unique_keys() {
        for table in [IMPACTS, RESOURCE_USES, OUTPUT_FLOWS, UNIT_GROUPS, FLOW_PROPERTIES] {
            let mut keys: Vec<&str> = table.iter().map(|(key, _)| *key).collect();
            keys.sort_unstable();
            let before = keys.len();
            keys.dedup();
            assert_eq!(before, keys.len());
        }
    }
}
