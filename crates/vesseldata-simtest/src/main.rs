//! VesselData Headless Lifecycle Harness
//!
//! Drives the module database through complete scenarios: editor build,
//! launch, flight save and reload, unload/reload, docking, undocking and
//! destruction. Runs entirely in-process against a `hecs` scene.
//!
//! Usage:
//!   cargo run -p vesseldata-simtest
//!   cargo run -p vesseldata-simtest -- --verbose

use hecs::{Entity, World};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use vesseldata_core::ids::ScriptedIdSource;
use vesseldata_core::persistence;
use vesseldata_core::prelude::*;

// ── Part catalog ────────────────────────────────────────────────────────
const CATALOG_JSON: &str = include_str!("../../../data/part_catalog.json");

#[derive(Debug, Deserialize)]
struct CatalogPart {
    name: String,
    title: String,
    modules: Vec<CatalogModule>,
}

#[derive(Debug, Deserialize)]
struct CatalogModule {
    kind: String,
    values: BTreeMap<String, String>,
}

type Catalog = HashMap<String, Arc<PartPrefab>>;

fn load_catalog() -> Result<Catalog, serde_json::Error> {
    let parts: Vec<CatalogPart> = serde_json::from_str(CATALOG_JSON)?;
    Ok(parts
        .into_iter()
        .map(|part| {
            let mut prefab = PartPrefab::new(part.name.as_str()).with_title(part.title);
            for module in part.modules {
                let mut config = ConfigNode::new("MODULE");
                for (key, value) in &module.values {
                    config.add_value(key.as_str(), value);
                }
                prefab = prefab.with_module(module.kind, config);
            }
            (part.name, prefab.into_shared())
        })
        .collect())
}

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

fn check(results: &mut Vec<TestResult>, name: &str, passed: bool, detail: String) {
    results.push(TestResult {
        name: name.into(),
        passed,
        detail,
    });
}

fn main() {
    let verbose = std::env::args().any(|a| a == "--verbose");
    let level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
    println!("=== VesselData Lifecycle Harness ===\n");

    let mut results = Vec::new();

    let catalog = match load_catalog() {
        Ok(catalog) => catalog,
        Err(e) => {
            println!("  ✗ catalog_parse: {}", e);
            std::process::exit(1);
        }
    };
    log::info!("loaded {} parts from the catalog", catalog.len());
    let registry = Arc::new(TypeRegistry::scan());

    // 1. Registry and catalog
    results.extend(validate_registry(&registry, &catalog, verbose));

    // 2. Editor session and launch
    results.extend(validate_launch(&registry, &catalog, verbose));

    // 3. Launch atomicity
    results.extend(validate_failed_launch(&registry, &catalog));

    // 4. Flight save and reload
    results.extend(validate_flight_round_trip(&registry, &catalog, verbose));

    // 5. Unload and reload
    results.extend(validate_unload_reload(&registry, &catalog));

    // 6. Docking and undocking
    results.extend(validate_docking(&registry, &catalog, verbose));

    // 7. Cross-record relations
    results.extend(validate_relations(&registry, &catalog));

    // ── Summary ──
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed, total, failed
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

// ── Scenario helpers ────────────────────────────────────────────────────

const STATION: &[(u32, &str)] = &[
    (1, "crewPod"),
    (2, "hitchhiker"),
    (3, "inflatableHab"),
    (4, "rtg"),
    (5, "decoupler"),
];

const LANDER: &[(u32, &str)] = &[(10, "crewPod"), (11, "rtg")];

fn database(registry: &Arc<TypeRegistry>) -> Database {
    Database::new(registry.clone(), DatabaseConfig::default().with_seed(2024))
}

/// Place `parts` in a fresh editor session
fn build_ship(
    db: &mut Database,
    scene: &mut World,
    catalog: &Catalog,
    name: &str,
    parts: &[(u32, &str)],
) -> Result<Vec<Entity>, String> {
    db.begin_ship_session(name);
    let mut entities = Vec::new();
    for (id, part_name) in parts {
        let prefab = catalog
            .get(*part_name)
            .ok_or_else(|| format!("no part `{}` in catalog", part_name))?;
        let part = spawn_part(scene, PartId(*id), None, prefab.clone());
        db.ship_part_added(scene, part).map_err(|e| e.to_string())?;
        entities.push(part);
    }
    Ok(entities)
}

fn launch(
    db: &mut Database,
    scene: &mut World,
    catalog: &Catalog,
    vessel: VesselId,
    name: &str,
    parts: &[(u32, &str)],
) -> Result<Vec<Entity>, String> {
    let entities = build_ship(db, scene, catalog, name, parts)?;
    db.launch(scene, vessel, name).map_err(|e| e.to_string())?;
    Ok(entities)
}

fn consistency(db: &Database) -> (bool, String) {
    match db.check_consistency() {
        Ok(()) => (true, format!("{} records consistent", db.arena().len())),
        Err(e) => (false, e.to_string()),
    }
}

fn failure(results: &mut Vec<TestResult>, name: &str, e: String) -> Vec<TestResult> {
    check(results, name, false, e);
    std::mem::take(results)
}

// ── 1. Registry ─────────────────────────────────────────────────────────

fn validate_registry(registry: &TypeRegistry, catalog: &Catalog, verbose: bool) -> Vec<TestResult> {
    println!("--- Type Registry ---");
    let mut results = Vec::new();

    let builtin = [
        ModuleKind::of::<HabitatData>(),
        ModuleKind::of::<ProcessControllerData>(),
        ModuleKind::of::<RadiationEmitterData>(),
    ];
    let missing: Vec<_> = builtin
        .iter()
        .filter(|k| registry.resolve(k.component_kind).ok() != Some(**k))
        .map(|k| k.component_kind)
        .collect();
    check(
        &mut results,
        "registry_builtin_kinds",
        missing.is_empty(),
        if missing.is_empty() {
            format!("{} kinds registered", registry.len())
        } else {
            format!("missing: {}", missing.join(", "))
        },
    );

    let unknown: HashSet<&str> = catalog
        .values()
        .flat_map(|p| p.modules.iter())
        .map(|m| m.component_kind.as_str())
        .filter(|k| !registry.is_known_component(k))
        .collect();
    check(
        &mut results,
        "catalog_unknown_kinds",
        unknown.len() == 1 && unknown.contains("ModuleDecouple"),
        format!("unknown component kinds: {:?}", unknown),
    );

    if verbose {
        for kind in registry.kinds() {
            println!("    {} → {}", kind.component_kind, kind.data_kind);
        }
    }
    results
}

// ── 2. Launch ───────────────────────────────────────────────────────────

fn validate_launch(registry: &Arc<TypeRegistry>, catalog: &Catalog, verbose: bool) -> Vec<TestResult> {
    println!("--- Editor & Launch ---");
    let mut results = Vec::new();
    let mut db = database(registry);
    let mut scene = World::new();

    if let Err(e) = build_ship(&mut db, &mut scene, catalog, "Station", STATION) {
        return failure(&mut results, "editor_build", e);
    }
    let ship_records: Vec<ModuleId> = db
        .ship()
        .map(|s| s.parts().module_ids().collect())
        .unwrap_or_default();
    check(
        &mut results,
        "editor_records_provisional",
        ship_records.len() == 6 && ship_records.iter().all(|id| !id.is_permanent()),
        format!("{} records on 5 parts", ship_records.len()),
    );

    let promoted = match db.launch(&mut scene, VesselId(1), "Station") {
        Ok(promoted) => promoted,
        Err(e) => return failure(&mut results, "launch", e.to_string()),
    };
    let all_permanent = db.arena().iter().all(|r| r.id().is_permanent());
    check(
        &mut results,
        "launch_promotes_all",
        promoted == 6 && all_permanent && db.ship().is_none(),
        format!("{} records promoted", promoted),
    );

    let (ok, detail) = consistency(&db);
    check(&mut results, "launch_consistent", ok, detail);

    db.tick(60.0);
    let scrubber = db
        .try_get_record_of_kind::<ProcessControllerData>(PartId(1))
        .map(|p| p.running_seconds)
        .unwrap_or_default();
    check(
        &mut results,
        "tick_updates_started_records",
        scrubber == 60.0,
        format!("scrubber ran {}s", scrubber),
    );

    let volume = db
        .vessel_aggregate(VesselId(1))
        .map(|a| a.get("habitat.volume"))
        .unwrap_or_default();
    // the inflatable habitat starts retracted and does not count
    check(
        &mut results,
        "aggregate_habitat_volume",
        volume == 12.5,
        format!("habitable volume {} m3", volume),
    );

    if verbose {
        for record in db.records_in_scope(CollectionScope::Vessel(VesselId(1))) {
            println!("    part {} {} {}", record.part(), record.data_kind(), record.id());
        }
    }
    results
}

fn validate_failed_launch(registry: &Arc<TypeRegistry>, catalog: &Catalog) -> Vec<TestResult> {
    println!("--- Launch Atomicity ---");
    let mut results = Vec::new();
    // six provisional ids, two permanent ids, then the same candidate forever
    let source = ScriptedIdSource::new(vec![1, 2, 3, 4, 5, 6, 500, 501]);
    let mut db = Database::with_id_source(registry.clone(), DatabaseConfig::default(), Box::new(source));
    let mut scene = World::new();

    if let Err(e) = build_ship(&mut db, &mut scene, catalog, "Doomed", STATION) {
        return failure(&mut results, "editor_build", e);
    }
    let before: Vec<ModuleId> = db
        .ship()
        .map(|s| s.parts().module_ids().collect())
        .unwrap_or_default();

    let outcome = db.launch(&mut scene, VesselId(1), "Doomed");
    check(
        &mut results,
        "launch_failure_reported",
        matches!(outcome, Err(LaunchError::PartialPromotion { failed_at: 2, .. })),
        format!("{:?}", outcome),
    );

    let after: Vec<ModuleId> = db
        .ship()
        .map(|s| s.parts().module_ids().collect())
        .unwrap_or_default();
    check(
        &mut results,
        "launch_failure_rolls_back",
        after == before && db.arena().permanent_count() == 0 && db.vessel(VesselId(1)).is_none(),
        format!(
            "{} ship records kept, {} permanent ids",
            after.len(),
            db.arena().permanent_count()
        ),
    );
    results
}

// ── 4. Flight save ──────────────────────────────────────────────────────

fn validate_flight_round_trip(
    registry: &Arc<TypeRegistry>,
    catalog: &Catalog,
    verbose: bool,
) -> Vec<TestResult> {
    println!("--- Flight Save ---");
    let mut results = Vec::new();
    let mut db = database(registry);
    let mut scene = World::new();

    let parts = match launch(&mut db, &mut scene, catalog, VesselId(1), "Station", STATION) {
        Ok(parts) => parts,
        Err(e) => return failure(&mut results, "launch", e),
    };
    if let Some(habitat) = db.try_get_record_of_kind_mut::<HabitatData>(PartId(2)) {
        habitat.crew_count = 3;
    }

    let mut buffer = Vec::new();
    if let Err(e) = persistence::write_flight(&mut buffer, &db.save_flight()) {
        return failure(&mut results, "flight_write", e.to_string());
    }
    if verbose {
        println!("    flight save is {} bytes", buffer.len());
    }
    let saved = match persistence::read_flight(buffer.as_slice()) {
        Ok(saved) => saved,
        Err(e) => return failure(&mut results, "flight_read", e.to_string()),
    };

    let mut protos = vec![ProtoVessel::from_scene(&scene, VesselId(1), "Station", &parts)];
    let mut reloaded = database(registry);
    let restored = match reloaded.load_flight(&mut protos, &saved) {
        Ok(restored) => restored,
        Err(e) => return failure(&mut results, "flight_load", e.to_string()),
    };
    check(
        &mut results,
        "flight_records_restored",
        restored == 6,
        format!("{} of 6 records restored", restored),
    );

    let same_ids = (1..=5).all(|p| {
        db.part_record(PartId(p)).map(|r| r.modules())
            == reloaded.part_record(PartId(p)).map(|r| r.modules())
    });
    let crew = reloaded
        .try_get_record_of_kind::<HabitatData>(PartId(2))
        .map(|h| h.crew_count);
    check(
        &mut results,
        "flight_round_trip_fields",
        same_ids && crew == Some(3),
        format!("ids preserved: {}, crew: {:?}", same_ids, crew),
    );

    let (ok, detail) = consistency(&reloaded);
    check(&mut results, "flight_reload_consistent", ok, detail);
    results
}

// ── 5. Unload / reload ──────────────────────────────────────────────────

fn validate_unload_reload(registry: &Arc<TypeRegistry>, catalog: &Catalog) -> Vec<TestResult> {
    println!("--- Unload & Reload ---");
    let mut results = Vec::new();
    let mut db = database(registry);
    let mut scene = World::new();

    let parts = match launch(&mut db, &mut scene, catalog, VesselId(1), "Station", STATION) {
        Ok(parts) => parts,
        Err(e) => return failure(&mut results, "launch", e),
    };
    db.tick(10.0);

    let suspended = db.vessel_unloaded(VesselId(1)).unwrap_or_default();
    db.tick(10.0);
    let report = match db.vessel_loaded(&mut scene, VesselId(1), &parts) {
        Ok(report) => report,
        Err(e) => return failure(&mut results, "vessel_loaded", e.to_string()),
    };
    check(
        &mut results,
        "reload_relinks_records",
        suspended == 6 && report.relinked == 6 && report.created == 0,
        format!("{} suspended, {:?}", suspended, report),
    );

    let ran = db
        .try_get_record_of_kind::<ProcessControllerData>(PartId(1))
        .map(|p| p.running_seconds);
    check(
        &mut results,
        "suspended_records_not_updated",
        ran == Some(10.0),
        format!("scrubber ran {:?}s", ran),
    );
    results
}

// ── 6. Docking ──────────────────────────────────────────────────────────

fn validate_docking(registry: &Arc<TypeRegistry>, catalog: &Catalog, verbose: bool) -> Vec<TestResult> {
    println!("--- Docking ---");
    let mut results = Vec::new();
    let mut db = database(registry);
    let mut scene = World::new();

    if let Err(e) = launch(&mut db, &mut scene, catalog, VesselId(1), "Station", STATION) {
        return failure(&mut results, "launch_station", e);
    }
    if let Err(e) = launch(&mut db, &mut scene, catalog, VesselId(2), "Lander", LANDER) {
        return failure(&mut results, "launch_lander", e);
    }
    let ids_before: Vec<ModuleId> = db.arena().iter().map(|r| r.id()).collect();

    let docked = db.dock(&mut scene, VesselId(2), VesselId(1));
    let discarded = db.discard_vessel(VesselId(2));
    let merged_parts = db.vessel(VesselId(1)).map(|v| v.parts().len());
    check(
        &mut results,
        "dock_merges_parts",
        docked == Ok(2) && discarded.is_ok() && merged_parts == Some(7),
        format!("docked {:?}, merged vessel has {:?} parts", docked, merged_parts),
    );

    let undocked = db.undock(
        &mut scene,
        VesselId(1),
        VesselId(3),
        "Lander",
        &[PartId(10), PartId(11)],
    );
    let ids_after: HashSet<ModuleId> = db.arena().iter().map(|r| r.id()).collect();
    check(
        &mut results,
        "undock_conserves_ids",
        undocked == Ok(2)
            && ids_after.len() == ids_before.len()
            && ids_before.iter().all(|id| ids_after.contains(id)),
        format!("{} ids before, {} after", ids_before.len(), ids_after.len()),
    );

    let station = db
        .vessel_aggregate(VesselId(1))
        .map(|a| a.get("habitat.volume"))
        .unwrap_or_default();
    let lander = db
        .vessel_aggregate(VesselId(3))
        .map(|a| a.get("habitat.volume"))
        .unwrap_or_default();
    check(
        &mut results,
        "undock_recomputes_aggregates",
        station == 12.5 && lander == 4.5,
        format!("station {} m3, lander {} m3", station, lander),
    );

    let (ok, detail) = consistency(&db);
    check(&mut results, "docking_consistent", ok, detail);

    if verbose {
        for vessel in db.vessels() {
            println!("    vessel {} `{}`: {:?}", vessel.id(), vessel.name(), vessel.parts().part_ids());
        }
    }
    results
}

// ── 7. Relations ────────────────────────────────────────────────────────

fn validate_relations(registry: &Arc<TypeRegistry>, catalog: &Catalog) -> Vec<TestResult> {
    println!("--- Cross-record Relations ---");
    let mut results = Vec::new();
    let mut db = database(registry);
    let mut scene = World::new();

    if let Err(e) = launch(&mut db, &mut scene, catalog, VesselId(1), "Station", STATION) {
        return failure(&mut results, "launch", e);
    }
    let scope = CollectionScope::Vessel(VesselId(1));
    let habitats: Vec<PermanentId> = db
        .enabled_records_of_kind::<HabitatData>(scope)
        .filter_map(|(id, _)| id.permanent())
        .collect();

    if let Some(emitter) = db.try_get_record_of_kind_mut::<RadiationEmitterData>(PartId(4)) {
        for habitat in &habitats {
            emitter.set_habitat_radiation(*habitat, 0.1);
        }
    }

    let destroyed = db.part_destroyed(PartId(2));
    let live: HashSet<PermanentId> = db
        .records_in_scope(scope)
        .filter_map(|r| r.id().permanent())
        .collect();
    let pruned = db
        .try_get_record_of_kind_mut::<RadiationEmitterData>(PartId(4))
        .map(|emitter| emitter.prune(|id| live.contains(&id)))
        .unwrap_or_default();
    check(
        &mut results,
        "destroyed_habitat_pruned",
        destroyed == 1 && habitats.len() == 3 && pruned == 1,
        format!(
            "{} habitats referenced, {} pruned after destruction",
            habitats.len(),
            pruned
        ),
    );

    let destroyed = db.vessel_destroyed(VesselId(1)).unwrap_or_default();
    check(
        &mut results,
        "vessel_destroyed_empties_index",
        destroyed == 5 && db.arena().is_empty(),
        format!("{} records destroyed", destroyed),
    );
    results
}
