//! USB discovery of Ledger devices

use crate::error::{Error, Result};
use crate::hid::HidStream;
use crate::types::{DeviceModel, LEDGER_VENDOR_ID};
use hidapi::{DeviceInfo, HidApi};
use log::debug;
use serde::Serialize;

/// A recognised Ledger, as enumerated (not opened)
#[derive(Debug, Clone, Serialize)]
pub struct LedgerDevice {
    pub model: DeviceModel,
    pub path: String,
    pub serial_number: Option<String>,
}

fn recognise(info: &DeviceInfo) -> Option<DeviceModel> {
    if info.vendor_id() != LEDGER_VENDOR_ID {
        return None;
    }
    DeviceModel::from_product_id(info.product_id())
}

fn find_devices(api: &HidApi) -> Vec<(DeviceModel, &DeviceInfo)> {
    api.device_list()
        .filter_map(|info| recognise(info).map(|model| (model, info)))
        .collect()
}

/// List every connected Nano S, Nano X or Stax.
pub fn list_devices() -> Result<Vec<LedgerDevice>> {
    let api = HidApi::new()?;
    Ok(find_devices(&api)
        .into_iter()
        .map(|(model, info)| LedgerDevice {
            model,
            path: info.path().to_string_lossy().into_owned(),
            serial_number: info.serial_number().map(String::from),
        })
        .collect())
}

/// Exactly one candidate or an error; never a silent pick.
pub(crate) fn select_unique<T>(mut candidates: Vec<T>) -> Result<T> {
    match candidates.len() {
        0 => Err(Error::DeviceNotFound),
        1 => Ok(candidates.remove(0)),
        n => Err(Error::MultipleDevices(n)),
    }
}

/// Open the single connected Ledger.
pub fn open_unique() -> Result<(DeviceModel, HidStream)> {
    let api = HidApi::new()?;
    let found = find_devices(&api);
    debug!("Found {} Ledger device(s)", found.len());

    let (model, info) = select_unique(found)?;
    debug!("Opening {model} at {}", info.path().to_string_lossy());
    let device = info.open_device(&api)?;
    Ok((model, HidStream::new(device)))
}
