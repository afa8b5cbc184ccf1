// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Property tests: every serialized request decodes back through the raw
//! envelope path the server uses.

use proptest::prelude::*;

use eq_core::QueuePos;

use crate::request::{
    AddItemParams, GroupParams, MoveParams, PauseOption, PauseParams, RawRequest, Request,
    RunsParams, SelectorParams, StopOption, StopParams,
};

fn queue_pos_strategy() -> impl Strategy<Value = QueuePos> {
    prop_oneof![
        Just(QueuePos::Front),
        Just(QueuePos::Back),
        (-10i64..20).prop_map(QueuePos::Index),
    ]
}

fn uid_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9]{1,12}".prop_map(|s| format!("itm-{s}"))
}

fn selector_strategy() -> impl Strategy<Value = SelectorParams> {
    (
        proptest::option::of(queue_pos_strategy()),
        proptest::option::of(uid_strategy()),
    )
        .prop_map(|(pos, uid)| SelectorParams { pos, uid })
}

fn parameterless_strategy() -> impl Strategy<Value = Request> {
    proptest::sample::select(vec![
        Request::Ping,
        Request::Status,
        Request::QueueGet,
        Request::QueueClear,
        Request::QueueStart,
        Request::QueueStop,
        Request::QueueStopCancel,
        Request::HistoryGet,
        Request::HistoryClear,
        Request::EnvironmentOpen,
        Request::EnvironmentClose,
        Request::EnvironmentDestroy,
        Request::ReResume,
        Request::ReStop,
        Request::ReAbort,
        Request::ReHalt,
        Request::PermissionsReload,
        Request::ManagerKill,
    ])
}

fn request_strategy() -> impl Strategy<Value = Request> {
    prop_oneof![
        parameterless_strategy(),
        selector_strategy().prop_map(Request::QueueItemGet),
        selector_strategy().prop_map(Request::QueueItemRemove),
        (
            proptest::option::of(uid_strategy()),
            proptest::option::of(queue_pos_strategy()),
        )
            .prop_map(|(uid, pos_dest)| {
                Request::QueueItemMove(MoveParams { uid, pos_dest, ..Default::default() })
            }),
        (
            proptest::option::of("[A-Za-z ]{1,16}"),
            proptest::option::of("[a-z_]{1,12}"),
            proptest::option::of(queue_pos_strategy()),
        )
            .prop_map(|(user, user_group, pos)| {
                Request::QueueItemAdd(AddItemParams { user, user_group, pos, ..Default::default() })
            }),
        proptest::option::of(prop_oneof![
            Just(PauseOption::Deferred),
            Just(PauseOption::Immediate)
        ])
        .prop_map(|option| Request::RePause(PauseParams { option })),
        prop_oneof![
            Just(eq_core::RunsOption::Active),
            Just(eq_core::RunsOption::Open),
            Just(eq_core::RunsOption::Closed),
        ]
        .prop_map(|option| Request::ReRuns(RunsParams { option })),
        proptest::option::of("[a-z_]{1,12}")
            .prop_map(|user_group| Request::PlansAllowed(GroupParams { user_group })),
        proptest::option::of("[a-z_]{1,12}")
            .prop_map(|user_group| Request::DevicesAllowed(GroupParams { user_group })),
        proptest::option::of(prop_oneof![Just(StopOption::SafeOn), Just(StopOption::SafeOff)])
            .prop_map(|option| Request::ManagerStop(StopParams { option })),
    ]
}

proptest! {
    #[test]
    fn serialized_requests_decode_through_the_raw_path(request in request_strategy()) {
        let value = serde_json::to_value(&request).unwrap();
        let raw: RawRequest = serde_json::from_value(value).unwrap();
        let back = Request::from_raw(raw).unwrap();
        prop_assert_eq!(back, request);
    }

    #[test]
    fn framed_requests_round_trip(request in request_strategy()) {
        let encoded = crate::encode(&request).unwrap();
        let raw: RawRequest = crate::decode(&encoded).unwrap();
        let back = Request::from_raw(raw).unwrap();
        prop_assert_eq!(back, request);
    }
}
