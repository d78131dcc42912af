// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Concurrent access to one engine from many threads.
//!
//! Contended tests release their threads together through a [`Barrier`].

use chrono::{TimeDelta, Utc};
use loyalty_ledger::{
    CampaignId, Code, CodeGenerator, CodeKind, Engine, LedgerConfig, LedgerError, NewCampaign,
    Role, ShopperId, Staff, VoucherStatus,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

const THREADS: usize = 16;

fn staff() -> Staff {
    Role::Issuer.staff().unwrap()
}

fn open_campaign(engine: &Engine) -> CampaignId {
    let owner = Role::Owner.owner().unwrap();
    let company = engine.register_company("Kopi Kita", None).unwrap();
    engine
        .create_campaign(
            &owner,
            NewCampaign {
                company_id: company.id,
                title: "Coffee Club".into(),
                start_date: Utc::now() - TimeDelta::days(1),
                end_date: Utc::now() + TimeDelta::days(1),
                min_points: None,
                spend_per_point: dec!(10),
                description: None,
            },
        )
        .unwrap()
        .id
}

fn credit(engine: &Engine, campaign: CampaignId, shopper: ShopperId, spend: Decimal) {
    let issued = engine.issue_voucher(&staff(), campaign, spend).unwrap();
    engine.claim_voucher(&issued.voucher.code, shopper).unwrap();
}

/// Returns the same code forever.
struct Constant;

impl CodeGenerator for Constant {
    fn generate(&self) -> Code {
        Code::from("SAMECODE0000")
    }
}

/// Walks a small ring of codes, so later draws collide with earlier ones.
struct Cycling {
    next: AtomicU32,
    size: u32,
}

impl Cycling {
    fn new(size: u32) -> Self {
        Self {
            next: AtomicU32::new(0),
            size,
        }
    }
}

impl CodeGenerator for Cycling {
    fn generate(&self) -> Code {
        let n = self.next.fetch_add(1, Ordering::SeqCst) % self.size;
        Code::from(format!("RING{n:08}"))
    }
}

#[test]
fn concurrent_claims_on_one_voucher_credit_once() {
    let engine = Arc::new(Engine::new());
    let campaign = open_campaign(&engine);
    let shoppers: Vec<ShopperId> = (0..THREADS)
        .map(|i| {
            engine
                .register_shopper(&format!("08{i:04}"), &format!("Shopper {i}"))
                .unwrap()
                .id
        })
        .collect();
    let issued = engine.issue_voucher(&staff(), campaign, dec!(70)).unwrap();
    let code = issued.voucher.code;

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = shoppers
        .iter()
        .map(|&shopper| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            let code = code.clone();
            thread::spawn(move || {
                barrier.wait();
                engine.claim_voucher(&code, shopper)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    let winner = winners[0].voucher.shopper_id().unwrap();
    let used_at = winners[0].voucher.used_at();

    for result in results.iter().filter(|r| r.is_err()) {
        assert_eq!(result, &Err(LedgerError::AlreadyUsed { used_at }));
    }

    for &shopper in &shoppers {
        let expected = if shopper == winner { 7 } else { 0 };
        assert_eq!(engine.balance(shopper), Ok(expected));
    }
    assert_eq!(engine.journal().len(), 1);
    assert!(matches!(
        winners[0].voucher.status,
        VoucherStatus::Used { shopper_id, .. } if shopper_id == winner
    ));
}

#[test]
fn concurrent_claims_by_one_shopper_credit_once() {
    let engine = Arc::new(Engine::new());
    let campaign = open_campaign(&engine);
    let shopper = engine.register_shopper("0811", "Ayu").unwrap().id;
    let code = engine
        .issue_voucher(&staff(), campaign, dec!(50))
        .unwrap()
        .voucher
        .code;

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            let code = code.clone();
            thread::spawn(move || {
                barrier.wait();
                engine.claim_voucher(&code, shopper).is_ok()
            })
        })
        .collect();
    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(successes, 1);
    assert_eq!(engine.balance(shopper), Ok(5));
}

#[test]
fn concurrent_issues_of_one_claim_succeed_once() {
    let engine = Arc::new(Engine::new());
    let campaign = open_campaign(&engine);
    let reward = engine
        .create_reward(&staff(), campaign, "Free latte", 10)
        .unwrap();
    let shopper = engine.register_shopper("0811", "Ayu").unwrap().id;
    credit(&engine, campaign, shopper, dec!(120));
    let code = engine.generate_claim(shopper, reward.id).unwrap().claim.code;

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            let code = code.clone();
            thread::spawn(move || {
                let staff = staff();
                barrier.wait();
                engine.issue_claim(&staff, &code)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    let issued_at = winners[0].issued_at().unwrap();

    for result in results.iter().filter(|r| r.is_err()) {
        assert_eq!(result, &Err(LedgerError::AlreadyIssued { issued_at }));
    }
    assert_eq!(
        engine.verify_claim(&staff(), &code).unwrap().issued_at(),
        Some(issued_at)
    );
    assert_eq!(engine.balance(shopper), Ok(2));
}

#[test]
fn concurrent_reward_requests_never_overdraw() {
    let engine = Arc::new(Engine::new());
    let campaign = open_campaign(&engine);
    let staff = staff();
    let reward = engine
        .create_reward(&staff, campaign, "Free latte", 10)
        .unwrap();
    let shopper = engine.register_shopper("0811", "Ayu").unwrap().id;
    credit(&engine, campaign, shopper, dec!(150));

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                engine.generate_claim(shopper, reward.id)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    for result in results.iter().filter(|r| r.is_err()) {
        assert_eq!(
            result,
            &Err(LedgerError::InsufficientPoints {
                current: 5,
                required: 10,
            })
        );
    }
    assert_eq!(engine.balance(shopper), Ok(5));
    assert_eq!(engine.journal().net_points(shopper), 5);
}

#[test]
fn concurrent_spends_stop_at_balance() {
    let engine = Arc::new(Engine::new());
    let campaign = open_campaign(&engine);
    let reward = engine
        .create_reward(&staff(), campaign, "Cookie", 3)
        .unwrap();
    let shopper = engine.register_shopper("0811", "Ayu").unwrap().id;
    // 20 points pay for six cookies
    credit(&engine, campaign, shopper, dec!(200));

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                engine.generate_claim(shopper, reward.id).is_ok()
            })
        })
        .collect();
    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(successes, 6);
    assert_eq!(engine.balance(shopper), Ok(2));
}

#[test]
fn concurrent_issuance_mints_distinct_codes() {
    let engine = Arc::new(Engine::new());
    let campaign = open_campaign(&engine);

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                (0..50)
                    .map(|_| {
                        engine
                            .issue_voucher(&staff(), campaign, dec!(10))
                            .unwrap()
                            .voucher
                            .code
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let mut codes: Vec<Code> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    let total = codes.len();
    codes.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    codes.dedup();
    assert_eq!(codes.len(), total);
}

#[test]
fn colliding_generator_is_retried_under_contention() {
    let engine = Arc::new(Engine::with_config(LedgerConfig {
        max_mint_attempts: None,
        ..LedgerConfig::default()
    })
    .with_generator(Cycling::new(64)));
    let campaign = open_campaign(&engine);

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                (0..2)
                    .map(|_| {
                        engine
                            .issue_voucher(&staff(), campaign, dec!(10))
                            .unwrap()
                            .voucher
                            .code
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let mut codes: Vec<Code> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    codes.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    codes.dedup();
    assert_eq!(codes.len(), THREADS * 2);
}

#[test]
fn exhausted_voucher_codes_leave_no_voucher() {
    let engine = Engine::with_config(LedgerConfig {
        max_mint_attempts: Some(4),
        ..LedgerConfig::default()
    })
    .with_generator(Constant);
    let campaign = open_campaign(&engine);
    let shopper = engine.register_shopper("0811", "Ayu").unwrap().id;

    let first = engine.issue_voucher(&staff(), campaign, dec!(10)).unwrap();
    assert_eq!(
        engine.issue_voucher(&staff(), campaign, dec!(20)),
        Err(LedgerError::ResourceExhausted {
            kind: CodeKind::Voucher,
            attempts: 4,
        })
    );

    // The only voucher under the code is the first one
    let claimed = engine.claim_voucher(&first.voucher.code, shopper).unwrap();
    assert_eq!(claimed.points_earned, 1);
}

#[test]
fn exhausted_claim_codes_roll_back_debit() {
    let engine = Engine::with_config(LedgerConfig {
        max_mint_attempts: Some(3),
        ..LedgerConfig::default()
    })
    .with_generator(Constant);
    let campaign = open_campaign(&engine);
    let reward = engine
        .create_reward(&staff(), campaign, "Cookie", 2)
        .unwrap();
    let shopper = engine.register_shopper("0811", "Ayu").unwrap().id;
    credit(&engine, campaign, shopper, dec!(100));

    // Voucher and claim codes are separate namespaces
    let first = engine.generate_claim(shopper, reward.id).unwrap();
    assert_eq!(first.claim.code, Code::from("SAMECODE0000"));
    assert_eq!(first.remaining_points, 8);

    assert_eq!(
        engine.generate_claim(shopper, reward.id),
        Err(LedgerError::ResourceExhausted {
            kind: CodeKind::Claim,
            attempts: 3,
        })
    );
    assert_eq!(engine.balance(shopper), Ok(8));
    assert_eq!(engine.journal().len(), 2);
}

#[test]
fn many_shoppers_redeem_in_parallel() {
    let engine = Arc::new(Engine::new());
    let campaign = open_campaign(&engine);

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let shopper = engine
                    .register_shopper(&format!("08{i:04}"), "Shopper")
                    .unwrap()
                    .id;
                for _ in 0..10 {
                    let issued = engine.issue_voucher(&staff(), campaign, dec!(20)).unwrap();
                    engine.claim_voucher(&issued.voucher.code, shopper).unwrap();
                }
                shopper
            })
        })
        .collect();
    let shoppers: Vec<ShopperId> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for shopper in shoppers {
        assert_eq!(engine.balance(shopper), Ok(20));
        assert_eq!(engine.journal().net_points(shopper), 20);
    }
    assert_eq!(engine.journal().len(), THREADS * 10);
}
