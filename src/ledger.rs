//! The coordinating ledger: chain, live state, pending pool, and the
//! equivocation table behind one mutable surface.
//!
//! One logical writer at a time: admission, sealing, and chain replacement
//! all take `&mut self`, so a node owns the [Ledger] behind a single
//! `Mutex` (or on one thread) and holds the lock across each
//! read-modify-write. Peer broadcast is dispatched by the caller after the
//! lock is released; nothing here blocks on the network.
//!
//! Blocks commit all-or-nothing. A sealed block's transactions are applied
//! before it is appended; a candidate chain is replayed to a complete
//! post-state before anything local is touched, then chain and state are
//! swapped together.

use crate::{
    block::{now_millis, Block, GENESIS_PREVIOUS_HASH},
    consensus::{self, Mode},
    mempool::Mempool,
    merkle,
    state::{Account, Remittance, State},
    transaction::Transaction,
    Config, Error,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::atomic::AtomicBool,
};
use tracing::{debug, info, warn};

pub struct Ledger {
    config: Config,
    chain: Vec<Block>,
    state: State,
    mempool: Mempool,
    /// Height each validator last sealed, for equivocation slashing.
    last_signed: BTreeMap<String, u64>,
}

impl Ledger {
    /// A fresh ledger: the genesis block plus the configured allocations.
    pub fn new(config: Config) -> Self {
        let state = State::genesis(&config);
        let chain = vec![Block::genesis(now_millis())];
        Self {
            config,
            chain,
            state,
            mempool: Mempool::new(),
            last_signed: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn tip(&self) -> &Block {
        &self.chain[self.chain.len() - 1]
    }

    pub fn height(&self) -> u64 {
        self.tip().index
    }

    /// The block at `index`, if the chain reaches that height.
    pub fn block(&self, index: u64) -> Option<&Block> {
        self.chain.get(index as usize)
    }

    pub fn account(&self, address: &str) -> Account {
        self.state.account(address)
    }

    pub fn remittance(&self, id: &str) -> Option<&Remittance> {
        self.state.remits.get(id)
    }

    pub fn pending(&self) -> &[Transaction] {
        self.mempool.transactions()
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Validate `tx` against the live state and queue it for the next
    /// block. Rejection leaves every table untouched.
    pub fn submit(&mut self, tx: Transaction) -> Result<(), Error> {
        let digest = tx.digest();
        match self.mempool.admit(&mut self.state, tx) {
            Ok(()) => {
                debug!(tx = %digest, pending = self.mempool.len(), "transaction admitted");
                Ok(())
            }
            Err(err) => {
                debug!(tx = %digest, %err, "transaction rejected");
                Err(err)
            }
        }
    }

    /// Assemble the pending transactions into a block, run the configured
    /// consensus, commit the state transition, and append the sealed block.
    ///
    /// Assembly settles the queue in order against a scratch copy of the
    /// live state. A transaction that no longer fits (an unstake past the
    /// bonded stake, a transfer the queued predecessors already spent the
    /// balance on, a duplicate escrow id) is dropped from the pool along
    /// with the sender's queued successors, its admission nonce rolled
    /// back, so it can never reach a block the chain's own replay would
    /// reject.
    ///
    /// Returns `None` for the normal non-outcomes: an empty pool, losing
    /// the Proof-of-Stake selection, or a cancelled Proof-of-Work search.
    /// Aside from pruning unsettleable transactions, all of them leave the
    /// pool, state, and chain exactly as before the attempt.
    pub fn mine(&mut self, miner: &str, cancel: &AtomicBool) -> Option<Block> {
        if self.mempool.is_empty() {
            debug!("nothing to mine");
            return None;
        }
        let mut scratch = self.state.clone();
        let mut transactions: Vec<Transaction> = Vec::new();
        let mut dropped: Vec<Transaction> = Vec::new();
        let mut barred: BTreeSet<String> = BTreeSet::new();
        for tx in self.mempool.transactions() {
            if !barred.contains(&tx.sender) && scratch.settle(tx, &self.config).is_ok() {
                transactions.push(tx.clone());
            } else {
                // Later transactions from this sender would leave a nonce
                // gap; they go too.
                barred.insert(tx.sender.clone());
                dropped.push(tx.clone());
            }
        }
        if !dropped.is_empty() {
            for tx in &dropped {
                self.state.account_mut(&tx.sender).nonce -= 1;
                warn!(tx = %tx.digest(), sender = %tx.sender, "dropped transaction that cannot settle");
            }
            let gone: BTreeSet<String> = dropped.iter().map(Transaction::digest).collect();
            self.mempool.retain(|tx| !gone.contains(&tx.digest()));
        }
        if transactions.is_empty() {
            debug!("nothing to mine");
            return None;
        }
        if self.config.enable_reward {
            let reward = self
                .total_fees(&transactions)
                .and_then(|fees| self.config.reward_transaction(miner, fees));
            match reward {
                Some(reward) => transactions.push(reward),
                None => {
                    debug!("reward total does not fit; attempt abandoned");
                    return None;
                }
            }
        }

        let previous_hash = self.tip().hash.clone();
        let mut block = Block::new(
            self.tip().index + 1,
            previous_hash.clone(),
            now_millis(),
            transactions,
        );
        block.merkle_root = merkle::root(&block.tx_digests());

        match self.config.mode {
            Mode::ProofOfStake => {
                let seed = consensus::seed(&previous_hash, &block.merkle_root);
                let validator = consensus::select_validator(&seed, &self.state, &self.config);
                if validator != miner {
                    debug!(%miner, %validator, "not selected for this round");
                    return None;
                }
                // Check-and-record runs inside this same `&mut self`
                // critical section: two attempts at one height cannot both
                // observe "not yet signed".
                let height = block.index;
                if self.last_signed.get(miner) == Some(&height) {
                    let account = self.state.account_mut(miner);
                    let slashed = account.stake / 2;
                    account.stake -= slashed;
                    warn!(validator = %miner, slashed, height, "equivocation slashed");
                }
                self.last_signed.insert(miner.to_string(), height);

                block.hash = block.compute_hash();
                let inflation = self.config.stake_reward();
                self.state.account_mut(miner).balance += inflation;
            }
            Mode::ProofOfWork => {
                if !consensus::solve(&mut block, self.config.difficulty, cancel) {
                    debug!(height = block.index, "mining attempt cancelled");
                    return None;
                }
            }
        }

        for tx in &block.transactions {
            self.state.apply(tx, &self.config);
        }
        self.mempool.clear();
        info!(
            height = block.index,
            hash = %block.hash,
            txs = block.transactions.len(),
            "block sealed"
        );
        self.chain.push(block.clone());
        Some(block)
    }

    /// Replay `chain` from genesis against a scratch state, enforcing the
    /// full validation suite. Returns the rebuilt post-state, or the first
    /// violation encountered. The live ledger is never touched.
    pub fn replay(&self, chain: &[Block]) -> Result<State, Error> {
        let genesis = match chain.first() {
            Some(genesis) => genesis,
            None => return Err(Error::ChainLinkage("empty chain")),
        };
        if genesis.index != 0 || genesis.previous_hash != GENESIS_PREVIOUS_HASH {
            return Err(Error::ChainLinkage("malformed genesis"));
        }
        if !genesis.is_self_consistent() {
            return Err(Error::HashMismatch { index: 0 });
        }

        let mut state = State::genesis(&self.config);
        for (position, block) in chain.iter().enumerate().skip(1) {
            let previous = &chain[position - 1];
            self.check_header(block, previous)?;
            self.check_reward(block, previous, &state)?;
            for tx in &block.transactions {
                if !self.config.is_reward(tx) {
                    tx.well_formed()?;
                    if !tx.verify() {
                        return Err(Error::SignatureInvalid);
                    }
                }
                state.execute(tx, &self.config)?;
            }
        }
        Ok(state)
    }

    /// Whether `chain` replays cleanly from genesis.
    pub fn validate(&self, chain: &[Block]) -> bool {
        self.replay(chain).is_ok()
    }

    /// Whether the local chain replays cleanly.
    pub fn is_valid(&self) -> bool {
        self.validate(&self.chain)
    }

    /// Longest-valid-chain fork choice: adopt `candidate` iff it is
    /// strictly longer than the local chain and replays cleanly. On
    /// adoption the chain and the replayed post-state are swapped in
    /// together; pending transactions and the equivocation table are
    /// dropped with the abandoned fork.
    pub fn replace_chain(&mut self, candidate: Vec<Block>) -> bool {
        if candidate.len() <= self.chain.len() {
            debug!(
                local = self.chain.len(),
                candidate = candidate.len(),
                "candidate chain is not longer"
            );
            return false;
        }
        let state = match self.replay(&candidate) {
            Ok(state) => state,
            Err(err) => {
                debug!(%err, "candidate chain rejected");
                return false;
            }
        };
        info!(height = candidate.len() as u64 - 1, "adopting longer chain");
        self.chain = candidate;
        self.state = state;
        self.mempool.clear();
        self.last_signed.clear();
        true
    }

    /// Sum of the non-reward fees, or `None` when the total does not fit a
    /// `u64`. Replay feeds this attacker-controlled fields, so the
    /// overflow is an invalid-block signal, never a wrap.
    fn total_fees(&self, transactions: &[Transaction]) -> Option<u64> {
        transactions
            .iter()
            .filter(|tx| !self.config.is_reward(tx))
            .try_fold(0u64, |total, tx| total.checked_add(tx.fee))
    }

    fn check_header(&self, block: &Block, previous: &Block) -> Result<(), Error> {
        if block.previous_hash != previous.hash {
            return Err(Error::ChainLinkage("previous hash mismatch"));
        }
        if block.index != previous.index + 1 {
            return Err(Error::ChainLinkage("index out of sequence"));
        }
        if self.config.mode == Mode::ProofOfWork
            && !consensus::meets_difficulty(&block.hash, self.config.difficulty)
        {
            return Err(Error::DifficultyNotMet { index: block.index });
        }
        if !block.merkle_root.is_empty() && block.merkle_root != merkle::root(&block.tx_digests()) {
            return Err(Error::MerkleMismatch { index: block.index });
        }
        if block.hash != block.compute_hash() {
            return Err(Error::HashMismatch { index: block.index });
        }
        Ok(())
    }

    /// Reward accounting: no reward transaction at all when rewards are
    /// disabled; exactly one covering the base reward plus collected fees
    /// when enabled; under Proof-of-Stake its recipient must be the
    /// validator the seed selects against the pre-block state.
    fn check_reward(&self, block: &Block, previous: &Block, state: &State) -> Result<(), Error> {
        let rewards: Vec<&Transaction> = block
            .transactions
            .iter()
            .filter(|tx| self.config.is_reward(tx))
            .collect();
        if !self.config.enable_reward {
            if !rewards.is_empty() {
                return Err(Error::RewardMismatch("rewards are disabled"));
            }
        } else {
            if rewards.len() > 1 {
                return Err(Error::RewardMismatch("more than one reward transaction"));
            }
            let reward = match rewards.first() {
                Some(reward) => *reward,
                None => return Err(Error::RewardMismatch("missing reward transaction")),
            };
            let fees = self
                .total_fees(&block.transactions)
                .ok_or(Error::RewardMismatch("fee total overflows"))?;
            let expected = self
                .config
                .block_reward
                .checked_add(fees)
                .ok_or(Error::RewardMismatch("reward total overflows"))?;
            if reward.amount != expected {
                return Err(Error::RewardMismatch("amount does not cover fees"));
            }
        }
        if self.config.mode == Mode::ProofOfStake {
            if let Some(reward) = rewards.first() {
                let seed = consensus::seed(&previous.hash, &merkle::root(&block.tx_digests()));
                let validator = consensus::select_validator(&seed, state, &self.config);
                if reward.recipient.as_deref() != Some(validator.as_str()) {
                    return Err(Error::ConsensusIneligible { index: block.index });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        crypto::{sha256_hex, PrivateKey},
        transaction::{Kind, Payload},
    };
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    fn config(mode: Mode, premine: &[(&String, u64)]) -> Config {
        Config {
            mode,
            difficulty: 1,
            premine: premine
                .iter()
                .map(|(address, amount)| ((*address).clone(), *amount))
                .collect(),
            ..Config::default()
        }
    }

    fn keypair() -> (PrivateKey, String) {
        let key = PrivateKey::random();
        let address = key.address();
        (key, address)
    }

    fn signed(
        key: &PrivateKey,
        kind: Kind,
        recipient: Option<String>,
        amount: u64,
        fee: u64,
        nonce: u64,
        payload: Option<Payload>,
    ) -> Transaction {
        let mut tx = Transaction::new(kind, key.address(), recipient, amount, fee, nonce, payload);
        tx.sign(key);
        tx
    }

    fn mine(ledger: &mut Ledger, miner: &str) -> Option<Block> {
        ledger.mine(miner, &AtomicBool::new(false))
    }

    #[test]
    fn test_stake_and_unstake_roundtrip() {
        let (key, address) = keypair();
        let mut ledger = Ledger::new(config(Mode::ProofOfWork, &[(&address, 100_000_000)]));

        let stake = signed(&key, Kind::Stake, None, 10_000_000, 0, 1, None);
        ledger.submit(stake).unwrap();
        assert!(mine(&mut ledger, &address).is_some());
        assert_eq!(ledger.account(&address).balance, 90_000_000);
        assert_eq!(ledger.account(&address).stake, 10_000_000);

        let unstake = signed(&key, Kind::Unstake, None, 7_000_000, 0, 2, None);
        ledger.submit(unstake).unwrap();
        assert!(mine(&mut ledger, &address).is_some());
        assert_eq!(ledger.account(&address).stake, 3_000_000);
        assert_eq!(ledger.account(&address).balance, 97_000_000);
    }

    #[test]
    fn test_pow_block_meets_difficulty() {
        let (key, address) = keypair();
        let mut ledger = Ledger::new(config(Mode::ProofOfWork, &[(&address, 1_000)]));
        ledger
            .submit(signed(&key, Kind::Pay, Some("bob".into()), 10, 0, 1, None))
            .unwrap();
        let block = mine(&mut ledger, &address).unwrap();
        assert!(consensus::meets_difficulty(&block.hash, 1));
        assert_eq!(ledger.height(), 1);
        assert!(ledger.pending().is_empty());
    }

    #[test]
    fn test_mine_with_empty_pool_is_a_noop() {
        let (_, address) = keypair();
        let mut ledger = Ledger::new(config(Mode::ProofOfWork, &[(&address, 1_000)]));
        assert!(mine(&mut ledger, &address).is_none());
        assert_eq!(ledger.height(), 0);
    }

    #[test]
    fn test_cancelled_pow_attempt_leaves_state_untouched() {
        let (key, address) = keypair();
        let mut ledger = Ledger::new(Config {
            // Unmeetable target: only cancellation ends the search.
            difficulty: 64,
            premine: vec![(address.clone(), 1_000)],
            ..Config::default()
        });
        ledger
            .submit(signed(&key, Kind::Pay, Some("bob".into()), 10, 0, 1, None))
            .unwrap();

        let cancel = Arc::new(AtomicBool::new(false));
        let trigger = Arc::clone(&cancel);
        let waker = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(50));
            trigger.store(true, Ordering::Relaxed);
        });
        assert!(ledger.mine(&address, &cancel).is_none());
        waker.join().unwrap();

        assert_eq!(ledger.height(), 0);
        assert_eq!(ledger.pending().len(), 1);
        assert_eq!(ledger.account("bob").balance, 0);
    }

    #[test]
    fn test_remit_roundtrip() {
        let (key_a, alice) = keypair();
        let (key_b, bob) = keypair();
        let mut ledger = Ledger::new(config(Mode::ProofOfWork, &[(&alice, 10_000_000)]));

        let code = "secret123";
        let open = signed(
            &key_a,
            Kind::OpenRemit,
            None,
            5_000_000,
            1_000,
            1,
            Some(Payload::OpenRemit {
                id: "remit-1".into(),
                recipient: bob.clone(),
                release_hash: sha256_hex(code.as_bytes()),
            }),
        );
        ledger.submit(open).unwrap();
        assert!(mine(&mut ledger, &alice).is_some());
        assert_eq!(ledger.account(&alice).balance, 4_999_000);
        assert!(!ledger.remittance("remit-1").unwrap().released);

        let claim = signed(
            &key_b,
            Kind::ClaimRemit,
            None,
            0,
            0,
            1,
            Some(Payload::ClaimRemit {
                id: "remit-1".into(),
                release_code: code.into(),
            }),
        );
        ledger.submit(claim).unwrap();
        assert!(mine(&mut ledger, &bob).is_some());
        assert_eq!(ledger.account(&bob).balance, 5_000_000);
        assert!(ledger.remittance("remit-1").unwrap().released);

        // A second claim passes admission (escrow state is not consulted
        // there) but releases nothing when applied.
        let again = signed(
            &key_b,
            Kind::ClaimRemit,
            None,
            0,
            0,
            2,
            Some(Payload::ClaimRemit {
                id: "remit-1".into(),
                release_code: code.into(),
            }),
        );
        ledger.submit(again).unwrap();
        assert!(mine(&mut ledger, &bob).is_some());
        assert_eq!(ledger.account(&bob).balance, 5_000_000);
    }

    #[test]
    fn test_reward_transaction_covers_fees() {
        let (key, address) = keypair();
        let mut ledger = Ledger::new(Config {
            enable_reward: true,
            difficulty: 1,
            premine: vec![(address.clone(), 10_000_000)],
            ..Config::default()
        });
        ledger
            .submit(signed(
                &key,
                Kind::Pay,
                Some("bob".into()),
                1_000_000,
                2_500,
                1,
                None,
            ))
            .unwrap();
        let block = mine(&mut ledger, &address).unwrap();

        let rewards: Vec<_> = block
            .transactions
            .iter()
            .filter(|tx| ledger.config().is_reward(tx))
            .collect();
        assert_eq!(rewards.len(), 1);
        assert_eq!(rewards[0].amount, ledger.config().block_reward + 2_500);
        assert_eq!(rewards[0].recipient.as_deref(), Some(address.as_str()));

        // Miner paid out the transfer and fee, then earned both back plus
        // the base reward.
        assert_eq!(
            ledger.account(&address).balance,
            10_000_000 - 1_000_000 - 2_500 + ledger.config().block_reward + 2_500
        );
        assert!(ledger.is_valid());
    }

    #[test]
    fn test_pos_bootstrap_then_staker_seals() {
        let (key, address) = keypair();
        let sentinel = Config::default().reward_sender;
        let mut ledger = Ledger::new(config(Mode::ProofOfStake, &[(&address, 100_000_000)]));

        // Before any stake is bonded only the reward-issuer fallback may
        // seal; the staker-to-be cannot.
        ledger
            .submit(signed(&key, Kind::Stake, None, 50_000_000, 0, 1, None))
            .unwrap();
        assert!(mine(&mut ledger, &address).is_none());
        assert_eq!(ledger.pending().len(), 1);
        assert!(mine(&mut ledger, &sentinel).is_some());
        assert_eq!(ledger.account(&address).stake, 50_000_000);

        // Now the sole staker is always selected and collects inflation.
        let (_, bob) = keypair();
        ledger
            .submit(signed(&key, Kind::Pay, Some(bob.clone()), 1_000_000, 0, 2, None))
            .unwrap();
        assert!(mine(&mut ledger, &address).is_some());
        assert_eq!(ledger.account(&bob).balance, 1_000_000);
        assert_eq!(
            ledger.account(&address).balance,
            100_000_000 - 50_000_000 - 1_000_000 + ledger.config().stake_reward()
        );
    }

    #[test]
    fn test_pos_excludes_everyone_but_the_selected_validator() {
        let (key_a, alice) = keypair();
        let (_, bob) = keypair();
        let sentinel = Config::default().reward_sender;
        let mut ledger = Ledger::new(config(
            Mode::ProofOfStake,
            &[(&alice, 100_000_000), (&bob, 100_000_000)],
        ));

        ledger
            .submit(signed(&key_a, Kind::Stake, None, 10_000_000, 0, 1, None))
            .unwrap();
        assert!(mine(&mut ledger, &sentinel).is_some());

        // Alice is the only staker; Bob's attempt produces nothing and the
        // pool survives for the rightful validator.
        ledger
            .submit(signed(
                &key_a,
                Kind::Pay,
                Some(bob.clone()),
                1_000_000,
                0,
                2,
                None,
            ))
            .unwrap();
        assert!(mine(&mut ledger, &bob).is_none());
        assert_eq!(ledger.pending().len(), 1);
        assert_eq!(ledger.height(), 1);
        assert!(mine(&mut ledger, &alice).is_some());
        assert_eq!(ledger.height(), 2);
    }

    #[test]
    fn test_double_signing_is_slashed_repeatedly() {
        let (key, address) = keypair();
        let sentinel = Config::default().reward_sender;
        let mut ledger = Ledger::new(config(Mode::ProofOfStake, &[(&address, 100_000_000)]));

        ledger
            .submit(signed(&key, Kind::Stake, None, 20_000_000, 0, 1, None))
            .unwrap();
        assert!(mine(&mut ledger, &sentinel).is_some());
        assert_eq!(ledger.account(&address).stake, 20_000_000);

        // Seal height 2 legitimately.
        ledger
            .submit(signed(&key, Kind::Pay, Some(address.clone()), 1, 0, 2, None))
            .unwrap();
        assert!(mine(&mut ledger, &address).is_some());

        // Drop the sealed tip and seal the same height again: equivocation,
        // half the stake is forfeited.
        ledger.chain.pop();
        ledger
            .submit(signed(&key, Kind::Pay, Some(address.clone()), 1, 0, 3, None))
            .unwrap();
        assert!(mine(&mut ledger, &address).is_some());
        assert_eq!(ledger.account(&address).stake, 10_000_000);

        // A third block at the same height slashes again, from the already
        // reduced stake.
        ledger.chain.pop();
        ledger
            .submit(signed(&key, Kind::Pay, Some(address.clone()), 1, 0, 4, None))
            .unwrap();
        assert!(mine(&mut ledger, &address).is_some());
        assert_eq!(ledger.account(&address).stake, 5_000_000);
    }

    #[test]
    fn test_replay_reproduces_live_state() {
        let (key_a, alice) = keypair();
        let (key_b, bob) = keypair();
        let mut ledger = Ledger::new(config(Mode::ProofOfWork, &[(&alice, 10_000_000)]));

        ledger
            .submit(signed(&key_a, Kind::Pay, Some(bob.clone()), 2_000_000, 100, 1, None))
            .unwrap();
        assert!(mine(&mut ledger, &alice).is_some());
        ledger
            .submit(signed(&key_a, Kind::Stake, None, 1_000_000, 0, 2, None))
            .unwrap();
        ledger
            .submit(signed(
                &key_b,
                Kind::OpenRemit,
                None,
                500_000,
                0,
                1,
                Some(Payload::OpenRemit {
                    id: "r1".into(),
                    recipient: alice.clone(),
                    release_hash: sha256_hex(b"code"),
                }),
            ))
            .unwrap();
        assert!(mine(&mut ledger, &alice).is_some());

        let replayed = ledger.replay(ledger.chain()).unwrap();
        assert_eq!(&replayed, ledger.state());
        // Two independent replays converge bit-for-bit.
        assert_eq!(replayed, ledger.replay(ledger.chain()).unwrap());
        assert!(ledger.is_valid());
    }

    #[test]
    fn test_replace_chain_adopts_only_longer_valid_chains() {
        let (key, address) = keypair();
        let cfg = config(Mode::ProofOfWork, &[(&address, 10_000_000)]);

        // Two nodes share genesis; one gets ahead.
        let mut local = Ledger::new(cfg.clone());
        let mut remote = Ledger::new(cfg.clone());
        remote.chain = local.chain.clone();

        local
            .submit(signed(&key, Kind::Pay, Some("bob".into()), 10, 0, 1, None))
            .unwrap();
        assert!(mine(&mut local, &address).is_some());

        remote
            .submit(signed(&key, Kind::Pay, Some("bob".into()), 10, 0, 1, None))
            .unwrap();
        assert!(mine(&mut remote, &address).is_some());
        remote
            .submit(signed(&key, Kind::Pay, Some("carol".into()), 20, 0, 2, None))
            .unwrap();
        assert!(mine(&mut remote, &address).is_some());

        // Same or shorter: refused regardless of validity.
        assert!(!remote.replace_chain(local.chain().to_vec()));

        // Longer and valid: adopted, with the replayed state swapped in.
        assert!(local.replace_chain(remote.chain().to_vec()));
        assert_eq!(local.height(), 2);
        assert_eq!(local.state(), remote.state());

        // Longer but failing replay at one block: refused.
        let mut forged = remote.chain().to_vec();
        forged[1].transactions[0].amount = 1_000_000_000;
        let mut fresh = Ledger::new(cfg);
        assert!(!fresh.replace_chain(forged));
        assert_eq!(fresh.height(), 0);
    }

    #[test]
    fn test_replay_rejects_broken_linkage() {
        let (key, address) = keypair();
        let mut ledger = Ledger::new(config(Mode::ProofOfWork, &[(&address, 10_000_000)]));
        ledger
            .submit(signed(&key, Kind::Pay, Some("bob".into()), 10, 0, 1, None))
            .unwrap();
        assert!(mine(&mut ledger, &address).is_some());

        let mut chain = ledger.chain().to_vec();
        chain[1].previous_hash = "ffff".into();
        assert_eq!(
            ledger.replay(&chain),
            Err(Error::ChainLinkage("previous hash mismatch"))
        );

        let mut chain = ledger.chain().to_vec();
        chain[1].index = 7;
        assert_eq!(
            ledger.replay(&chain),
            Err(Error::ChainLinkage("index out of sequence"))
        );
    }

    #[test]
    fn test_replay_rejects_wrong_pos_reward_recipient() {
        let (key, address) = keypair();
        let sentinel = Config::default().reward_sender;
        let mut ledger = Ledger::new(Config {
            mode: Mode::ProofOfStake,
            enable_reward: true,
            premine: vec![(address.clone(), 100_000_000)],
            ..Config::default()
        });

        // Bootstrap block sealed by the fallback, then a staker block.
        ledger
            .submit(signed(&key, Kind::Stake, None, 40_000_000, 0, 1, None))
            .unwrap();
        assert!(mine(&mut ledger, &sentinel).is_some());
        ledger
            .submit(signed(&key, Kind::Pay, Some(address.clone()), 1, 0, 2, None))
            .unwrap();
        assert!(mine(&mut ledger, &address).is_some());
        assert!(ledger.is_valid());

        // Redirect the second block's reward to an outsider and re-seal the
        // header so only the recipient check can object.
        let mut chain = ledger.chain().to_vec();
        let outsider = keypair().1;
        for tx in &mut chain[2].transactions {
            if ledger.config().is_reward(tx) {
                tx.recipient = Some(outsider.clone());
            }
        }
        chain[2].merkle_root = merkle::root(&chain[2].tx_digests());
        chain[2].hash = chain[2].compute_hash();
        assert_eq!(
            ledger.replay(&chain),
            Err(Error::ConsensusIneligible { index: 2 })
        );
    }

    #[test]
    fn test_mine_drops_unstake_exceeding_stake() {
        let (key, address) = keypair();
        let mut ledger = Ledger::new(config(Mode::ProofOfWork, &[(&address, 1_000)]));
        ledger
            .submit(signed(&key, Kind::Unstake, None, 10, 0, 1, None))
            .unwrap();
        assert!(mine(&mut ledger, &address).is_none());

        // The unsettleable transaction is gone, nothing was minted, and the
        // admission nonce is rolled back so the sender is not wedged.
        assert!(ledger.pending().is_empty());
        assert_eq!(ledger.height(), 0);
        assert_eq!(ledger.account(&address).balance, 1_000);
        assert_eq!(ledger.account(&address).stake, 0);
        ledger
            .submit(signed(&key, Kind::Pay, Some("bob".into()), 10, 0, 1, None))
            .unwrap();
        assert!(mine(&mut ledger, &address).is_some());
        assert_eq!(ledger.account("bob").balance, 10);
        assert!(ledger.is_valid());
    }

    #[test]
    fn test_mine_drops_jointly_overdrawing_transfers() {
        let (key, address) = keypair();
        let mut ledger = Ledger::new(config(Mode::ProofOfWork, &[(&address, 100)]));
        // Each transfer fits the starting balance; together they overdraw
        // it.
        ledger
            .submit(signed(&key, Kind::Pay, Some("bob".into()), 80, 0, 1, None))
            .unwrap();
        ledger
            .submit(signed(&key, Kind::Pay, Some("carol".into()), 80, 0, 2, None))
            .unwrap();
        // A transfer that would fit on its own is dropped with its
        // unsettleable predecessor to keep the nonce sequence gapless.
        ledger
            .submit(signed(&key, Kind::Pay, Some("dave".into()), 1, 0, 3, None))
            .unwrap();

        let block = mine(&mut ledger, &address).unwrap();
        assert_eq!(block.transactions.len(), 1);
        assert_eq!(ledger.account("bob").balance, 80);
        assert_eq!(ledger.account("carol").balance, 0);
        assert_eq!(ledger.account("dave").balance, 0);
        assert_eq!(ledger.account(&address).balance, 20);
        assert_eq!(ledger.account(&address).nonce, 1);
        assert!(ledger.is_valid());
        assert_eq!(&ledger.replay(ledger.chain()).unwrap(), ledger.state());
    }

    #[test]
    fn test_replay_rejects_overflowing_fee_totals() {
        let (_, address) = keypair();
        let ledger = Ledger::new(Config {
            enable_reward: true,
            difficulty: 0,
            premine: vec![(address.clone(), 1_000)],
            ..Config::default()
        });
        let genesis = ledger.chain()[0].clone();
        let reward = ledger.config().reward_transaction(&address, 0).unwrap();

        // One fee large enough that adding the base reward overflows.
        let hostile =
            Transaction::new(Kind::Pay, "evil", Some(address.clone()), 1, u64::MAX, 1, None);
        let mut block = Block::new(1, genesis.hash.clone(), 1, vec![hostile, reward.clone()]);
        block.merkle_root = merkle::root(&block.tx_digests());
        block.hash = block.compute_hash();
        assert_eq!(
            ledger.replay(&[genesis.clone(), block]),
            Err(Error::RewardMismatch("reward total overflows"))
        );

        // Fees whose running sum alone overflows.
        let first =
            Transaction::new(Kind::Pay, "evil", Some(address.clone()), 1, u64::MAX, 1, None);
        let second = Transaction::new(Kind::Pay, "evil2", Some(address.clone()), 1, 1, 1, None);
        let mut block = Block::new(1, genesis.hash.clone(), 1, vec![first, second, reward]);
        block.merkle_root = merkle::root(&block.tx_digests());
        block.hash = block.compute_hash();
        assert_eq!(
            ledger.replay(&[genesis, block]),
            Err(Error::RewardMismatch("fee total overflows"))
        );
    }

    #[test]
    fn test_replay_rejects_reward_when_disabled() {
        let (_, address) = keypair();
        let ledger = Ledger::new(Config {
            difficulty: 0,
            ..Config::default()
        });
        let genesis = ledger.chain()[0].clone();
        let reward = ledger
            .config()
            .reward_transaction(&address, 1_000_000_000)
            .unwrap();
        let mut block = Block::new(1, genesis.hash.clone(), 1, vec![reward]);
        block.merkle_root = merkle::root(&block.tx_digests());
        block.hash = block.compute_hash();
        assert_eq!(
            ledger.replay(&[genesis, block]),
            Err(Error::RewardMismatch("rewards are disabled"))
        );
    }

    #[test]
    fn test_no_double_spend_across_a_block_boundary() {
        let (key, address) = keypair();
        let mut ledger = Ledger::new(config(Mode::ProofOfWork, &[(&address, 100)]));

        ledger
            .submit(signed(&key, Kind::Pay, Some("bob".into()), 80, 0, 1, None))
            .unwrap();
        assert!(mine(&mut ledger, &address).is_some());

        // The same funds cannot be spent again.
        assert_eq!(
            ledger.submit(signed(&key, Kind::Pay, Some("bob".into()), 80, 0, 2, None)),
            Err(Error::InsufficientFunds {
                required: 80,
                available: 20
            })
        );
    }
}
