//! Shared async I2C bus
//!
//! Both sensors sit on the same bus. Each driver owns an [`AsyncI2cDevice`]
//! handle. Each transfer holds the bus lock only while that transfer runs,
//! and the lock is released between the transfers of a driver operation.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal::i2c::ErrorKind;
use embedded_hal_async::i2c::{ErrorType, I2c, Operation};

use crate::sensors::BusRecovery;

/// Shared handle to a bus guarded by an embassy [`Mutex`].
///
/// ```ignore
/// static I2C_BUS: StaticCell<Mutex<CriticalSectionRawMutex, Bus>> = StaticCell::new();
/// let bus = I2C_BUS.init(Mutex::new(i2c));
///
/// let max30102 = Max30102::new(AsyncI2cDevice::new(bus), Max30102Config::default());
/// let stc31 = Stc31::new(AsyncI2cDevice::new(bus), Delay, Co2Settings::default());
/// ```
pub struct AsyncI2cDevice<'a, T> {
    bus: &'a Mutex<CriticalSectionRawMutex, T>,
}

impl<'a, T> AsyncI2cDevice<'a, T> {
    #[inline]
    pub const fn new(bus: &'a Mutex<CriticalSectionRawMutex, T>) -> Self {
        Self { bus }
    }
}

impl<T> ErrorType for AsyncI2cDevice<'_, T>
where
    T: ErrorType,
{
    type Error = T::Error;
}

impl<T> I2c for AsyncI2cDevice<'_, T>
where
    T: I2c,
{
    #[inline]
    async fn read(&mut self, address: u8, read: &mut [u8]) -> Result<(), Self::Error> {
        self.bus.lock().await.read(address, read).await
    }

    #[inline]
    async fn write(&mut self, address: u8, write: &[u8]) -> Result<(), Self::Error> {
        self.bus.lock().await.write(address, write).await
    }

    #[inline]
    async fn write_read(
        &mut self,
        address: u8,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.bus.lock().await.write_read(address, write, read).await
    }

    #[inline]
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.bus.lock().await.transaction(address, operations).await
    }
}

/// Recovery acts on the whole bus, so it runs under the same lock.
impl<T> BusRecovery for AsyncI2cDevice<'_, T>
where
    T: BusRecovery,
{
    async fn recover_bus(&mut self) -> Result<(), ErrorKind> {
        self.bus.lock().await.recover_bus().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeStc31, block_on};

    #[test]
    fn test_devices_share_one_bus() {
        let bus = Mutex::<CriticalSectionRawMutex, _>::new(FakeStc31::new());
        let mut first = AsyncI2cDevice::new(&bus);
        let mut second = AsyncI2cDevice::new(&bus);

        block_on(first.write(0x29, &[0x36, 0x39])).unwrap();
        block_on(second.write(0x29, &[0x36, 0x7C])).unwrap();
        block_on(second.recover_bus()).unwrap();

        let bus = bus.into_inner();
        assert_eq!(bus.opcodes(), alloc::vec![0x3639, 0x367C]);
        assert_eq!(bus.recoveries, 1);
    }

    #[test]
    fn test_errors_pass_through() {
        let mut fake = FakeStc31::new();
        fake.fail_next = 1;
        let bus = Mutex::<CriticalSectionRawMutex, _>::new(fake);
        let mut device = AsyncI2cDevice::new(&bus);

        let mut buffer = [0u8; 3];
        assert!(block_on(device.read(0x29, &mut buffer)).is_err());
        assert!(block_on(device.read(0x29, &mut buffer)).is_ok());
    }
}
