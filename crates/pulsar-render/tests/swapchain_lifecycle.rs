// SPDX-License-Identifier: CEPL-1.0
mod common;

use common::{Event, MockBackend};
use pretty_assertions::assert_eq;
use pulsar_render::{RebuildOutcome, RenderSize, SwapchainLifecycle};

#[test]
fn back_to_back_rebuilds_are_identical_and_leak_free() {
    let surface = RenderSize::new(1024, 768);
    let (mut backend, initial) = MockBackend::started(surface);
    let baseline_live = backend.live_allocations;

    let mut lifecycle = SwapchainLifecycle::new(4);
    lifecycle.adopt(initial);

    let RebuildOutcome::Rebuilt(first) = lifecycle.rebuild(&mut backend).unwrap() else {
        panic!("first rebuild deferred");
    };
    let RebuildOutcome::Rebuilt(second) = lifecycle.rebuild(&mut backend).unwrap() else {
        panic!("second rebuild deferred");
    };

    assert_eq!(first, second);
    assert_eq!(first, initial);
    assert_eq!(backend.live_allocations, baseline_live);
    assert_eq!(backend.total_allocations, 3 * baseline_live as u64);
    assert_eq!(lifecycle.generation(), 2);
    assert_eq!(lifecycle.current(), Some(second));
}

#[test]
fn rebuild_order_is_poll_idle_destroy_create() {
    let (mut backend, info) = MockBackend::started(RenderSize::new(640, 480));
    let mut lifecycle = SwapchainLifecycle::new(4);
    lifecycle.adopt(info);

    lifecycle.rebuild(&mut backend).unwrap();
    assert_eq!(
        backend.events,
        vec![
            Event::QueryExtent,
            Event::DeviceIdle,
            Event::Destroy,
            Event::Create(RenderSize::new(640, 480)),
        ]
    );
}

#[test]
fn rebuild_follows_new_extent() {
    let (mut backend, info) = MockBackend::started(RenderSize::new(640, 480));
    let mut lifecycle = SwapchainLifecycle::new(4);
    lifecycle.adopt(info);

    backend.surface = RenderSize::new(1920, 1080);
    let out = lifecycle.rebuild(&mut backend).unwrap();
    let RebuildOutcome::Rebuilt(new) = out else {
        panic!("unexpected {out:?}");
    };
    assert_eq!(new.extent, RenderSize::new(1920, 1080));
    assert_eq!(new.format, info.format);
    assert_eq!(new.image_count, info.image_count);
}

#[test]
fn zero_extent_never_reaches_the_backend() {
    let (mut backend, info) = MockBackend::started(RenderSize::new(640, 480));
    let live = backend.live_allocations;
    backend.surface = RenderSize::new(0, 480);

    let mut lifecycle = SwapchainLifecycle::new(3);
    lifecycle.adopt(info);
    assert_eq!(lifecycle.rebuild(&mut backend).unwrap(), RebuildOutcome::Deferred);
    assert_eq!(backend.count(|e| matches!(e, Event::QueryExtent)), 3);
    assert_eq!(backend.count(|e| matches!(e, Event::WaitSurface)), 2);
    assert_eq!(backend.live_allocations, live);
    assert_eq!(lifecycle.current(), Some(info));
}

#[test]
fn surface_minimized_between_poll_and_create() {
    let surface = RenderSize::new(640, 480);
    let (mut backend, info) = MockBackend::started(surface);
    let baseline_live = backend.live_allocations;
    backend.minimized_at_create = 1;

    let mut lifecycle = SwapchainLifecycle::new(4);
    lifecycle.adopt(info);
    assert_eq!(lifecycle.rebuild(&mut backend).unwrap(), RebuildOutcome::Deferred);
    assert_eq!(
        backend.events,
        vec![Event::QueryExtent, Event::DeviceIdle, Event::Destroy, Event::CreateStale]
    );
    assert_eq!(backend.live_allocations, 0);
    assert_eq!(lifecycle.current(), None);
    assert_eq!(lifecycle.generation(), 0);

    let out = lifecycle.rebuild(&mut backend).unwrap();
    assert_eq!(out, RebuildOutcome::Rebuilt(info));
    assert_eq!(backend.live_allocations, baseline_live);
    assert_eq!(backend.total_allocations, 2 * baseline_live as u64);
    assert_eq!(lifecycle.generation(), 1);
}
