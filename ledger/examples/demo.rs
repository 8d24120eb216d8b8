//! Interactive CLI demo of the full VEGA ledger lifecycle.
//!
//! Walks through wallet provisioning, one-off payments, the refusal
//! taxonomy, idempotent retries, a recurring standing order through the
//! sweep, transaction history, and savings goals. The output uses ANSI
//! escape codes for colored, storytelling-style terminal rendering.
//!
//! Run with:
//!   cargo run --example demo --release

use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, TimeZone, Utc};

use vega_ledger::account::{AccountStore, Address, ReceiverRef};
use vega_ledger::config;
use vega_ledger::journal::Journal;
use vega_ledger::recurring::{Frequency, RecurringScheduler};
use vega_ledger::savings::GoalStore;
use vega_ledger::storage::VegaDB;
use vega_ledger::transfer::{LedgerEngine, TransferError, TransferRequest};

// ---------------------------------------------------------------------------
// ANSI color constants
// ---------------------------------------------------------------------------

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const BLUE: &str = "\x1b[34m";
const MAGENTA: &str = "\x1b[35m";
const CYAN: &str = "\x1b[36m";
const RED: &str = "\x1b[31m";
const WHITE: &str = "\x1b[37m";

const BG_BLUE: &str = "\x1b[44m";

// ---------------------------------------------------------------------------
// Display helpers
// ---------------------------------------------------------------------------

fn banner() {
    println!();
    println!(
        "{BG_BLUE}{BOLD}{WHITE}                                                                    {RESET}"
    );
    println!(
        "{BG_BLUE}{BOLD}{WHITE}    VEGA LEDGER  --  Custodial Wallet Walkthrough                   {RESET}"
    );
    println!(
        "{BG_BLUE}{BOLD}{WHITE}    Version 0.1.0  |  sled + optimistic commits + journal           {RESET}"
    );
    println!(
        "{BG_BLUE}{BOLD}{WHITE}                                                                    {RESET}"
    );
    println!();
}

fn section(num: u32, title: &str) {
    println!();
    println!(
        "{BOLD}{CYAN}===[{YELLOW} Step {num} {CYAN}]=============================================================={RESET}"
    );
    println!("{BOLD}{WHITE}  {title}{RESET}");
    println!(
        "{CYAN}------------------------------------------------------------------------{RESET}"
    );
}

fn subsection(text: &str) {
    println!("{DIM}{CYAN}  >> {text}{RESET}");
}

fn success(text: &str) {
    println!("{GREEN}  [OK] {text}{RESET}");
}

fn refused(text: &str) {
    println!("{RED}  [NO] {text}{RESET}");
}

fn info(label: &str, value: &str) {
    println!("{WHITE}  {BOLD}{label}:{RESET} {YELLOW}{value}{RESET}");
}

fn timing(label: &str, elapsed: std::time::Duration) {
    let ms = elapsed.as_secs_f64() * 1000.0;
    println!("{DIM}{MAGENTA}  [{label}: {ms:.2} ms]{RESET}");
}

fn address_display(name: &str, addr: &str, color: &str) {
    let prefix = &addr[..5.min(addr.len())];
    let suffix = &addr[addr.len().saturating_sub(8)..];
    println!(
        "  {color}{BOLD}{name}{RESET}  {DIM}{prefix}...{suffix}{RESET}  {DIM}({} chars){RESET}",
        addr.len()
    );
}

fn balance_row(name: &str, balance: u64, color: &str) {
    println!("  {color}{BOLD}{name:<12}{RESET}  {WHITE}{balance:>12}{RESET} {DIM}cents{RESET}");
}

fn separator() {
    println!(
        "{DIM}{CYAN}  . . . . . . . . . . . . . . . . . . . . . . . . . . . . . . . . . {RESET}"
    );
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    let demo_start = Instant::now();

    banner();

    // -----------------------------------------------------------------------
    // Step 1: Wallet Provisioning
    // -----------------------------------------------------------------------

    section(1, "Wallet Provisioning");
    subsection("Opening a temporary database and bringing up the ledger stack...");

    let t = Instant::now();
    let db = VegaDB::open_temporary().expect("temporary database");
    let accounts = Arc::new(AccountStore::new(&db));
    let journal = Arc::new(Journal::new(&db));
    let engine = LedgerEngine::new(Arc::clone(&accounts), Arc::clone(&journal));
    let scheduler = RecurringScheduler::new(&db, Arc::clone(&accounts), engine.clone());
    let goals = GoalStore::new(&db, Arc::clone(&accounts));
    timing("stack setup", t.elapsed());

    subsection("Creating three wallets (one with a vanity address)...");
    let t = Instant::now();
    let alice = accounts.create(None).expect("provision alice");
    let bob = accounts.create(None).expect("provision bob");
    let landlord = accounts
        .create(Some(Address::parse("rent@vega").expect("vanity address")))
        .expect("provision landlord");
    timing("provision x3", t.elapsed());

    println!();
    address_display("Alice    ", alice.address.as_str(), BLUE);
    address_display("Bob      ", bob.address.as_str(), GREEN);
    address_display("Landlord ", landlord.address.as_str(), MAGENTA);
    println!();
    println!("  {BOLD}{WHITE}--- Starting Balances ---{RESET}");
    balance_row("Alice", alice.balance, BLUE);
    balance_row("Bob", bob.balance, GREEN);
    balance_row("Landlord", landlord.balance, MAGENTA);
    println!();
    success("Every wallet opens with the house starting balance");

    // -----------------------------------------------------------------------
    // Step 2: First Payment
    // -----------------------------------------------------------------------

    section(2, "Transfer: Alice -> Bob (4,200 cents, by address)");
    subsection("Committing the transfer atomically: debit, credit, journal entry...");

    let t = Instant::now();
    let record = engine
        .transfer(&TransferRequest::new(
            alice.account_id,
            ReceiverRef::ByAddress(bob.address.as_str().to_string()),
            4_200,
        ))
        .expect("first payment");
    timing("commit + flush", t.elapsed());

    info("Transaction ID", &record.transaction_id.to_string());
    info("Journal sequence", &record.seq.to_string());

    separator();
    println!();
    println!("  {BOLD}{WHITE}--- Balances After Payment ---{RESET}");
    let a = accounts.get(&alice.account_id).unwrap().unwrap();
    let b = accounts.get(&bob.account_id).unwrap().unwrap();
    balance_row("Alice", a.balance, BLUE);
    balance_row("Bob", b.balance, GREEN);
    println!();
    success("Both sides moved in one storage transaction");

    // -----------------------------------------------------------------------
    // Step 3: The Ledger Says No
    // -----------------------------------------------------------------------

    section(3, "Refusals: Overreach and Self-Payment");
    subsection("Asking for more than Alice holds...");

    let err = engine
        .transfer(&TransferRequest::new(
            alice.account_id,
            ReceiverRef::ById(bob.account_id),
            10_000_000,
        ))
        .expect_err("overreach must be refused");
    match err {
        TransferError::InsufficientFunds {
            available,
            requested,
        } => refused(&format!(
            "insufficient funds: {available} available, {requested} requested"
        )),
        other => panic!("unexpected refusal: {other}"),
    }

    subsection("Alice tries to pay herself...");
    let err = engine
        .transfer(&TransferRequest::new(
            alice.account_id,
            ReceiverRef::ById(alice.account_id),
            100,
        ))
        .expect_err("self-payment must be refused");
    refused(&format!("{err}"));

    let untouched = accounts.get(&alice.account_id).unwrap().unwrap();
    assert_eq!(untouched.balance, a.balance);
    assert_eq!(journal.committed_count().unwrap(), 1);
    success("Refused transfers leave no trace: balances and journal untouched");

    // -----------------------------------------------------------------------
    // Step 4: Pay Exactly Once
    // -----------------------------------------------------------------------

    section(4, "Idempotent Retry");
    subsection("Sending the same request twice with one idempotency key...");

    let request = TransferRequest::new(
        bob.account_id,
        ReceiverRef::ById(alice.account_id),
        1_000,
    )
    .with_idempotency_key("demo-invoice-1");

    let first = engine.transfer(&request).expect("first attempt");
    let t = Instant::now();
    let second = engine.transfer(&request).expect("retry");
    timing("replay lookup", t.elapsed());

    assert_eq!(first.transaction_id, second.transaction_id);
    info("Transaction ID (both)", &first.transaction_id.to_string());
    info(
        "Journal entries",
        &journal.committed_count().unwrap().to_string(),
    );
    success("The retry replayed the committed record instead of paying again");

    // -----------------------------------------------------------------------
    // Step 5: Rent Day, Automated
    // -----------------------------------------------------------------------

    section(5, "Standing Order: Alice -> Landlord, Weekly");

    let created = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
    subsection("Registering a weekly instruction (first due one week out)...");
    let instruction = scheduler
        .create(
            &alice.account_id,
            landlord.address.as_str(),
            25_000,
            Frequency::Weekly,
            created,
        )
        .expect("standing order");
    info("Instruction ID", &instruction.instruction_id.to_string());
    info("Next due", &instruction.next_due_at.to_rfc3339());

    subsection("Sweeping six days in: nothing is due...");
    let early = scheduler.run_due(created + Duration::days(6)).unwrap();
    assert_eq!(early.executed, 0);
    info("Sweep report", &format!("{early:?}"));

    subsection("Sweeping on the due day...");
    let t = Instant::now();
    let due = scheduler.run_due(created + Duration::days(7)).unwrap();
    timing("sweep", t.elapsed());
    assert_eq!(due.executed, 1);
    info("Sweep report", &format!("{due:?}"));

    let rearmed = &scheduler.list_for_owner(&alice.account_id).unwrap()[0];
    info("Re-armed for", &rearmed.next_due_at.to_rfc3339());

    println!();
    let landlord_after = accounts.get(&landlord.account_id).unwrap().unwrap();
    balance_row("Landlord", landlord_after.balance, MAGENTA);
    println!();
    success("Rent paid through the same engine as every other transfer");

    // -----------------------------------------------------------------------
    // Step 6: The Paper Trail
    // -----------------------------------------------------------------------

    section(6, "Transaction History (newest first)");
    subsection("Listing everything that touched Alice's wallet...");

    let history = journal
        .list_for_account(&alice.account_id, None)
        .expect("history");
    println!();
    for entry in &history {
        let direction = if entry.sender_account_id == alice.account_id {
            format!("{RED}sent{RESET}    ")
        } else {
            format!("{GREEN}received{RESET}")
        };
        println!(
            "  {DIM}seq {:>3}{RESET}  {direction}  {WHITE}{:>8}{RESET} {DIM}cents{RESET}  {DIM}{}{RESET}",
            entry.seq,
            entry.amount,
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
        );
    }
    println!();
    success("One journal, one ordering, no forgotten payments");

    // -----------------------------------------------------------------------
    // Step 7: Saving Up
    // -----------------------------------------------------------------------

    section(7, "Savings Goal");
    subsection("Alice starts saving for something nicer than rent...");

    let goal = goals
        .create(&alice.account_id, "Tokyo trip", 250_000)
        .expect("goal");
    info("Goal", &goal.name);
    info("Target", &goal.target_amount.to_string());
    info("Saved so far", &goal.saved_amount.to_string());
    success("Goals keep score; the balance is untouched");

    // -----------------------------------------------------------------------
    // Closing stats
    // -----------------------------------------------------------------------

    println!();
    println!("  {BOLD}{WHITE}Ledger Totals:{RESET}");
    println!("  {DIM}----------------------------------------------{RESET}");
    info("Accounts", &accounts.count().to_string());
    info(
        "Committed transfers",
        &journal.committed_count().unwrap().to_string(),
    );
    info(
        "Standing instructions",
        &scheduler.instruction_count().to_string(),
    );
    info("Savings goals", &goals.count().to_string());
    info(
        "Total balance (conserved)",
        &accounts.total_balance().unwrap().to_string(),
    );
    info(
        "Starting total",
        &(3 * config::STARTING_BALANCE as u128).to_string(),
    );

    let total_elapsed = demo_start.elapsed();
    println!();
    println!(
        "  {BOLD}{GREEN}Total demo time: {:.2}s{RESET}",
        total_elapsed.as_secs_f64()
    );
    println!();
}
