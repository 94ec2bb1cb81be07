//! In-memory SMC register file.
//!
//! `MockSmc` answers the same transactions the real driver does, including the
//! two-level status codes, so the channel and the charge controller can be
//! exercised on any host. Clones share state: hand one clone to the code under
//! test and keep another to inspect what happened.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Connector, DataType, SMCParamStruct, Smc, SmcBytes, SmcKey, Transport, SMC_BYTES_LEN};
use crate::error::{Error, Result};
use crate::utils::bindings::{
    IO_RETURN_BAD_ARGUMENT, IO_RETURN_NOT_PRIVILEGED, IO_RETURN_SUCCESS, KERNEL_INDEX_SMC, SMC_CMD_READ_BYTES,
    SMC_CMD_READ_KEYINFO, SMC_CMD_WRITE_BYTES, SMC_RESULT_ERROR, SMC_RESULT_KEY_NOT_FOUND, SMC_RESULT_SUCCESS,
};

#[derive(Debug, Clone, Copy)]
struct Register {
    data_type: DataType,
    bytes: SmcBytes,
}

#[derive(Debug)]
struct State {
    registers: HashMap<SmcKey, Register>,
    writes: Vec<(SmcKey, Vec<u8>)>,
    failing_writes: HashMap<SmcKey, u8>,
    failing_reads: HashMap<SmcKey, u8>,
    hidden: HashSet<SmcKey>,
    privileged: bool,
    available: bool,
    opens: usize,
    closes: usize,
}

impl Default for State {
    fn default() -> Self {
        Self {
            registers: HashMap::new(),
            writes: Vec::new(),
            failing_writes: HashMap::new(),
            failing_reads: HashMap::new(),
            hidden: HashSet::new(),
            privileged: true,
            available: true,
            opens: 0,
            closes: 0,
        }
    }
}

/// A fake SMC backed by a map of registers
#[derive(Debug, Clone, Default)]
pub struct MockSmc {
    state: Arc<Mutex<State>>,
}

impl MockSmc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a register with an initial value
    pub fn with_key(self, key: &str, data_type: DataType, value: &[u8]) -> Self {
        let key = register_key(key);
        let mut bytes = [0u8; SMC_BYTES_LEN];
        let len = value.len().min(SMC_BYTES_LEN);
        bytes[..len].copy_from_slice(&value[..len]);
        self.state.lock().registers.insert(key, Register { data_type, bytes });
        self
    }

    /// A controller exposing only the newer `CHTE` switch
    pub fn tahoe(disabled: bool) -> Self {
        Self::new().with_key("CHTE", DataType::UINT32, &[u8::from(disabled), 0, 0, 0])
    }

    /// A controller exposing only the older `CH0B`/`CH0C` switches
    pub fn legacy(disabled: bool) -> Self {
        let value = if disabled { 0x02 } else { 0x00 };
        Self::new().with_key("CH0B", DataType::UINT8, &[value]).with_key("CH0C", DataType::UINT8, &[value])
    }

    /// Reads succeed but every write is refused at the transport level
    pub fn unprivileged(self) -> Self {
        self.state.lock().privileged = false;
        self
    }

    /// Writes to `key` come back with the given SMC result byte
    pub fn failing_writes(self, key: &str, smc_result: u8) -> Self {
        self.state.lock().failing_writes.insert(register_key(key), smc_result);
        self
    }

    /// Reads of `key` come back with the given SMC result byte; writes still land
    pub fn failing_reads(self, key: &str, smc_result: u8) -> Self {
        self.state.lock().failing_reads.insert(register_key(key), smc_result);
        self
    }

    /// The key exists but every transaction on it reports key-not-found
    pub fn hidden(self, key: &str) -> Self {
        self.state.lock().hidden.insert(register_key(key));
        self
    }

    /// `connect` fails as if the driver were missing
    pub fn unavailable(self) -> Self {
        self.state.lock().available = false;
        self
    }

    /// Current value of a register, trimmed to its declared size
    pub fn value(&self, key: &str) -> Option<Vec<u8>> {
        let key = register_key(key);
        self.state.lock().registers.get(&key).map(|reg| reg.bytes[..reg.data_type.size as usize].to_vec())
    }

    /// Every accepted write, in order
    pub fn writes(&self) -> Vec<(String, Vec<u8>)> {
        self.state.lock().writes.iter().map(|(key, bytes)| (key.to_string(), bytes.clone())).collect()
    }

    pub fn write_count(&self) -> usize {
        self.state.lock().writes.len()
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().opens
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().closes
    }

    fn handle(&self, input: &SMCParamStruct, output: &mut SMCParamStruct) -> i32 {
        let key = SmcKey::from_code(input.key);
        let mut state = self.state.lock();
        output.key = input.key;

        if state.hidden.contains(&key) {
            output.result = SMC_RESULT_KEY_NOT_FOUND;
            return IO_RETURN_SUCCESS;
        }

        match input.data8 {
            SMC_CMD_READ_BYTES | SMC_CMD_READ_KEYINFO => {
                let Some(reg) = state.registers.get(&key) else {
                    output.result = SMC_RESULT_KEY_NOT_FOUND;
                    return IO_RETURN_SUCCESS;
                };
                output.key_info.data_size = reg.data_type.size;
                output.key_info.data_type = reg.data_type.tag.code();
                if input.data8 == SMC_CMD_READ_BYTES {
                    if let Some(&smc_result) = state.failing_reads.get(&key) {
                        output.result = smc_result;
                        return IO_RETURN_SUCCESS;
                    }
                    output.bytes = reg.bytes;
                }
                output.result = SMC_RESULT_SUCCESS;
            }
            SMC_CMD_WRITE_BYTES => {
                if !state.privileged {
                    return IO_RETURN_NOT_PRIVILEGED;
                }
                if let Some(&smc_result) = state.failing_writes.get(&key) {
                    output.result = smc_result;
                    return IO_RETURN_SUCCESS;
                }
                let Some(reg) = state.registers.get_mut(&key) else {
                    output.result = SMC_RESULT_KEY_NOT_FOUND;
                    return IO_RETURN_SUCCESS;
                };
                let len = (input.key_info.data_size as usize).min(SMC_BYTES_LEN);
                reg.bytes = [0u8; SMC_BYTES_LEN];
                reg.bytes[..len].copy_from_slice(&input.bytes[..len]);
                state.writes.push((key, input.bytes[..len].to_vec()));
                output.result = SMC_RESULT_SUCCESS;
            }
            _ => output.result = SMC_RESULT_ERROR,
        }

        IO_RETURN_SUCCESS
    }
}

fn register_key(raw: &str) -> SmcKey {
    raw.parse().expect("mock register keys are four ASCII characters")
}

impl Transport for MockSmc {
    fn call_struct_method(&mut self, method: u32, input: &SMCParamStruct, output: &mut SMCParamStruct) -> i32 {
        if method != KERNEL_INDEX_SMC {
            return IO_RETURN_BAD_ARGUMENT;
        }
        self.handle(input, output)
    }

    fn close(&mut self) -> bool {
        self.state.lock().closes += 1;
        true
    }
}

impl Connector for MockSmc {
    fn connect(&self) -> Result<Smc> {
        let mut state = self.state.lock();
        if !state.available {
            return Err(Error::DriverNotFound);
        }
        state.opens += 1;
        drop(state);
        Ok(Smc::with_transport(Box::new(self.clone())))
    }
}
