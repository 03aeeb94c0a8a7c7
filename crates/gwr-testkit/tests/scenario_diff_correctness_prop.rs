//! Diff correctness over generated configurations.
//!
//! Both sides draw ids from one shared pool and names from another, chosen
//! independently, so records pair by id, by name, or not at all, and a
//! paired record may be renamed onto a name another record holds.
//!
//! GREEN when, for any current and desired configuration:
//! - the diff either applies to current and yields desired (ids aside), or
//!   is refused as a rename cycle or a blocked name handoff;
//! - diffing the result against desired yields no events.

use std::collections::{BTreeSet, HashMap};

use gwr_reconcile::{diff, DiffError};
use gwr_schemas::{Entity, ForeignRef};
use gwr_state::GatewayState;
use gwr_testkit::{route, semantic_view, service, simulate_apply, target, upstream};
use proptest::prelude::*;

const SERVICE_IDS: [&str; 3] = ["s0", "s1", "s2"];
const SERVICE_NAMES: [&str; 3] = ["a", "b", "c"];
const ROUTE_IDS: [&str; 3] = ["r0", "r1", "r2"];
const ROUTE_NAMES: [&str; 3] = ["x", "y", "z"];
const UPSTREAM_IDS: [&str; 2] = ["u0", "u1"];
const UPSTREAM_NAMES: [&str; 2] = ["p", "q"];
const ADDRS: [&str; 2] = ["10.0.0.1:80", "10.0.0.2:80"];
const HOSTS: [&str; 2] = ["h1.internal", "h2.internal"];
const PATHS: [&str; 2] = ["/x", "/y"];

#[derive(Clone, Debug)]
struct Shape {
    /// (name index, host index) per service id
    services: Vec<Option<(usize, usize)>>,
    /// (name index, service id index, path index) per route id
    routes: Vec<Option<(usize, usize, usize)>>,
    /// name index per upstream id
    upstreams: Vec<Option<usize>>,
    /// weight per (upstream id, address)
    targets: Vec<Option<u32>>,
}

fn shape() -> impl Strategy<Value = Shape> {
    (
        prop::collection::vec(
            prop::option::of((0..SERVICE_NAMES.len(), 0..HOSTS.len())),
            SERVICE_IDS.len(),
        ),
        prop::collection::vec(
            prop::option::of((0..ROUTE_NAMES.len(), 0..SERVICE_IDS.len(), 0..PATHS.len())),
            ROUTE_IDS.len(),
        ),
        prop::collection::vec(prop::option::of(0..UPSTREAM_NAMES.len()), UPSTREAM_IDS.len()),
        prop::collection::vec(prop::option::of(1..4u32), UPSTREAM_IDS.len() * ADDRS.len()),
    )
        .prop_map(|(services, routes, upstreams, targets)| Shape {
            services,
            routes,
            upstreams,
            targets,
        })
}

/// Current stores reference by id, as the admin API reports them; desired
/// stores reference by name, as configuration files do. A slot whose name is
/// already taken on the same side is left out, along with its dependents.
fn build(shape: &Shape, by_id: bool) -> GatewayState {
    let reference = |id: &str, name: &str| {
        if by_id {
            ForeignRef::by_id(id)
        } else {
            ForeignRef::by_name(name)
        }
    };
    let mut all: Vec<Entity> = Vec::new();

    let mut names = BTreeSet::new();
    let mut service_names: HashMap<usize, &str> = HashMap::new();
    for (si, slot) in shape.services.iter().enumerate() {
        let Some((name, host)) = slot else { continue };
        let name = SERVICE_NAMES[*name];
        if names.insert(name) {
            service_names.insert(si, name);
            all.push(service(SERVICE_IDS[si], name, HOSTS[*host]));
        }
    }

    let mut names = BTreeSet::new();
    for (ri, slot) in shape.routes.iter().enumerate() {
        let Some((name, svc, path)) = slot else { continue };
        let Some(service_name) = service_names.get(svc) else {
            continue;
        };
        let name = ROUTE_NAMES[*name];
        if names.insert(name) {
            all.push(route(
                ROUTE_IDS[ri],
                name,
                reference(SERVICE_IDS[*svc], service_name),
                PATHS[*path],
            ));
        }
    }

    let mut names = BTreeSet::new();
    for (ui, slot) in shape.upstreams.iter().enumerate() {
        let Some(name) = slot else { continue };
        let name = UPSTREAM_NAMES[*name];
        if !names.insert(name) {
            continue;
        }
        let id = UPSTREAM_IDS[ui];
        all.push(upstream(id, name));
        for (ai, addr) in ADDRS.iter().enumerate() {
            if let Some(weight) = shape.targets[ui * ADDRS.len() + ai] {
                all.push(target(&format!("t-{id}-{ai}"), reference(id, name), addr, Some(weight)));
            }
        }
    }
    GatewayState::from_entities(all).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn applying_the_diff_reaches_desired(cur in shape(), want in shape()) {
        let current = build(&cur, true);
        let desired = build(&want, false);

        let events = match diff(&current, &desired) {
            Ok(events) => events,
            Err(DiffError::RenameCycle { .. } | DiffError::HandoffBlocked { .. }) => return Ok(()),
            Err(other) => return Err(TestCaseError::fail(format!("unexpected diff error: {other}"))),
        };
        let applied = simulate_apply(&current, &events)
            .map_err(|e| TestCaseError::fail(format!("stream does not apply: {e}; events: {events:?}")))?;

        prop_assert_eq!(semantic_view(&applied), semantic_view(&desired));
        let again = diff(&applied, &desired).unwrap();
        prop_assert!(again.is_empty(), "residual events: {:?}", again);
    }

    #[test]
    fn identical_configurations_diff_empty(s in shape()) {
        let current = build(&s, true);
        let desired = build(&s, false);
        prop_assert!(diff(&current, &desired).unwrap().is_empty());
    }
}
