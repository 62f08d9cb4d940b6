//! AVCDecoderConfigurationRecord (avcC) 构建与解析.
//!
//! # avcC 布局
//! ```text
//! configurationVersion     (1 byte) = 1
//! AVCProfileIndication     (1 byte) = SPS[1]
//! profile_compatibility    (1 byte) = SPS[2]
//! AVCLevelIndication       (1 byte) = SPS[3]
//! 0xFF: 6 bits reserved + lengthSizeMinusOne = 3 (4 字节长度前缀)
//! 0xE1: 3 bits reserved + numOfSequenceParameterSets = 1
//! SPS length (2 bytes BE) + SPS
//! numOfPictureParameterSets (1 byte) = 1
//! PPS length (2 bytes BE) + PPS
//! ```

use log::debug;
use strand_core::{FixedBuffer, StrandError, StrandResult};

use super::nal::{NalUnitType, has_start_code, scan_nal_units};

/// lengthSizeMinusOne = 3, 高 6 位保留为 1
const LENGTH_SIZE_BYTE: u8 = 0xFF;
/// 1 个 SPS, 高 3 位保留为 1
const ONE_SPS_BYTE: u8 = 0xE1;

/// 由 extradata 构建 avcC 配置记录
///
/// - 不以起始码开头的输入视为已经是 avcC, 原样返回
/// - 否则扫描全部 NAL 单元, 以从左到右最后出现的 SPS / PPS 为准
///
/// 输出缓冲区按输入的 2 倍分配.
pub fn build_config_record(extradata: &[u8]) -> StrandResult<Vec<u8>> {
    let mut out = FixedBuffer::with_capacity(extradata.len() * 2);
    write_config_record(extradata, &mut out)?;
    Ok(out.into_vec())
}

/// 将 avcC 配置记录写入定长缓冲区
///
/// 失败时不留下任何部分写入的数据.
pub fn write_config_record(extradata: &[u8], out: &mut FixedBuffer) -> StrandResult<()> {
    if !has_start_code(extradata) {
        return out.write_bytes(extradata);
    }

    let mut sps: Option<&[u8]> = None;
    let mut pps: Option<&[u8]> = None;
    for nal in scan_nal_units(extradata) {
        // 重复出现时后者覆盖前者
        match NalUnitType::of(nal) {
            Some(NalUnitType::Sps) => sps = Some(nal),
            Some(NalUnitType::Pps) => pps = Some(nal),
            _ => {}
        }
    }

    let (sps, pps) = match (sps, pps) {
        (Some(sps), Some(pps)) => (sps, pps),
        (sps, pps) => {
            return Err(StrandError::Format(format!(
                "H.264: extradata 缺少参数集, has_sps={}, has_pps={}",
                sps.is_some(),
                pps.is_some()
            )));
        }
    };
    if sps.len() < 4 {
        return Err(StrandError::Format(format!(
            "H.264: SPS 太短, len={}",
            sps.len()
        )));
    }
    let (Ok(sps_len), Ok(pps_len)) = (u16::try_from(sps.len()), u16::try_from(pps.len())) else {
        return Err(StrandError::Format(format!(
            "H.264: 参数集超过 65535 字节, sps_len={}, pps_len={}",
            sps.len(),
            pps.len()
        )));
    };

    let checkpoint = out.len();
    let written = write_record(out, sps, sps_len, pps, pps_len);
    if written.is_err() {
        out.truncate(checkpoint);
    } else {
        debug!(
            "H.264: 生成 avcC, profile={} level={} sps_len={} pps_len={}",
            sps[1], sps[3], sps_len, pps_len
        );
    }
    written
}

fn write_record(
    out: &mut FixedBuffer,
    sps: &[u8],
    sps_len: u16,
    pps: &[u8],
    pps_len: u16,
) -> StrandResult<()> {
    out.write_u8(1)?; // configurationVersion
    out.write_u8(sps[1])?; // profile
    out.write_u8(sps[2])?; // profile compat
    out.write_u8(sps[3])?; // level
    out.write_u8(LENGTH_SIZE_BYTE)?;
    out.write_u8(ONE_SPS_BYTE)?;
    out.write_u16_be(sps_len)?;
    out.write_bytes(sps)?;
    out.write_u8(1)?; // numOfPictureParameterSets
    out.write_u16_be(pps_len)?;
    out.write_bytes(pps)
}

/// avcC 配置解析结果
#[derive(Debug)]
pub struct AvccConfig {
    /// AVCProfileIndication
    pub profile: u8,
    /// profile_compatibility
    pub profile_compatibility: u8,
    /// AVCLevelIndication
    pub level: u8,
    /// NAL 长度前缀大小 (字节)
    pub length_size: usize,
    /// SPS 列表
    pub sps_list: Vec<Vec<u8>>,
    /// PPS 列表
    pub pps_list: Vec<Vec<u8>>,
}

/// 解析 AVCDecoderConfigurationRecord
pub fn parse_config_record(data: &[u8]) -> StrandResult<AvccConfig> {
    if data.len() < 7 {
        return Err(StrandError::InvalidData("H.264: avcC 数据太短".into()));
    }

    let length_size = ((data[4] & 0x03) + 1) as usize;
    let mut pos = 6;
    let sps_list = read_parameter_sets(data, &mut pos, (data[5] & 0x1F) as usize, "SPS")?;

    let Some(&num_pps) = data.get(pos) else {
        return Err(StrandError::InvalidData(
            "H.264: avcC 缺少 numOfPictureParameterSets 字段".into(),
        ));
    };
    pos += 1;
    let pps_list = read_parameter_sets(data, &mut pos, num_pps as usize, "PPS")?;

    Ok(AvccConfig {
        profile: data[1],
        profile_compatibility: data[2],
        level: data[3],
        length_size,
        sps_list,
        pps_list,
    })
}

fn read_parameter_sets(
    data: &[u8],
    pos: &mut usize,
    count: usize,
    kind: &str,
) -> StrandResult<Vec<Vec<u8>>> {
    let mut list = Vec::with_capacity(count);
    for i in 0..count {
        if *pos + 2 > data.len() {
            return Err(StrandError::InvalidData(format!(
                "H.264: avcC {kind} 长度字段截断, index={i}"
            )));
        }
        let len = usize::from(u16::from_be_bytes([data[*pos], data[*pos + 1]]));
        *pos += 2;
        if *pos + len > data.len() {
            return Err(StrandError::InvalidData(format!(
                "H.264: avcC {kind} 数据截断, index={i}, declared_len={len}, remain={}",
                data.len() - *pos
            )));
        }
        list.push(data[*pos..*pos + len].to_vec());
        *pos += len;
    }
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPS: [u8; 6] = [0x67, 0x42, 0xC0, 0x1E, 0xAB, 0xCD];
    const PPS: [u8; 4] = [0x68, 0xCE, 0x38, 0x80];

    fn annex_b(units: &[&[u8]]) -> Vec<u8> {
        let mut data = Vec::new();
        for unit in units {
            data.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]);
            data.extend_from_slice(unit);
        }
        data
    }

    #[test]
    fn test_build_record_single_sps_pps() {
        let record = build_config_record(&annex_b(&[&SPS, &PPS])).unwrap();

        let mut expected = vec![0x01, 0x42, 0xC0, 0x1E, 0xFF, 0xE1, 0x00, 0x06];
        expected.extend_from_slice(&SPS);
        expected.extend_from_slice(&[0x01, 0x00, 0x04]);
        expected.extend_from_slice(&PPS);
        assert_eq!(record, expected);

        let parsed = parse_config_record(&record).unwrap();
        assert_eq!(parsed.profile, SPS[1]);
        assert_eq!(parsed.profile_compatibility, SPS[2]);
        assert_eq!(parsed.level, SPS[3]);
        assert_eq!(parsed.length_size, 4);
        assert_eq!(parsed.sps_list, vec![SPS.to_vec()]);
        assert_eq!(parsed.pps_list, vec![PPS.to_vec()]);
    }

    #[test]
    fn test_build_record_passthrough_without_start_code() {
        let boxed = [0x01, 0x64, 0x00, 0x1F, 0xFF, 0xE1, 0x00, 0x00, 0x01, 0x00, 0x00];
        assert_eq!(build_config_record(&boxed).unwrap(), boxed.to_vec());
    }

    #[test]
    fn test_build_record_missing_pps_fails() {
        let err = build_config_record(&annex_b(&[&SPS])).expect_err("缺少 PPS 应失败");
        assert!(matches!(err, StrandError::Format(_)));
    }

    #[test]
    fn test_build_record_missing_pps_leaves_buffer_untouched() {
        let mut out = FixedBuffer::with_capacity(64);
        out.write_u8(0x77).unwrap();
        assert!(write_config_record(&annex_b(&[&SPS, &[0x65, 0x88]]), &mut out).is_err());
        assert_eq!(out.as_slice(), &[0x77]);
    }

    #[test]
    fn test_build_record_short_sps_fails() {
        let err = build_config_record(&annex_b(&[&[0x67, 0x42, 0x00], &PPS]))
            .expect_err("SPS 不足 4 字节应失败");
        assert!(matches!(err, StrandError::Format(_)));
    }

    #[test]
    fn test_build_record_oversized_pps_fails() {
        let mut big_pps = vec![0x68];
        big_pps.resize(70_000, 0xAA);
        let err = build_config_record(&annex_b(&[&SPS, &big_pps])).expect_err("PPS 过长应失败");
        assert!(matches!(err, StrandError::Format(_)));
    }

    #[test]
    fn test_build_record_last_sps_wins() {
        let first_sps = [0x67, 0x4D, 0x40, 0x28, 0x01];
        let record = build_config_record(&annex_b(&[&first_sps, &PPS, &SPS])).unwrap();
        let parsed = parse_config_record(&record).unwrap();
        assert_eq!(parsed.sps_list, vec![SPS.to_vec()]);
        assert_eq!(parsed.profile, 0x42);
        assert_eq!(parsed.level, 0x1E);
    }

    #[test]
    fn test_write_record_into_undersized_buffer_rolls_back() {
        let mut out = FixedBuffer::with_capacity(12);
        let err = write_config_record(&annex_b(&[&SPS, &PPS]), &mut out).expect_err("容量不足");
        assert!(matches!(err, StrandError::BufferOverflow { .. }));
        assert!(out.is_empty());
    }

    #[test]
    fn test_parse_record_reject_truncated_sps() {
        let data = [0x01, 0x64, 0x00, 0x1E, 0xFF, 0xE1, 0x00, 0x04, 0x67, 0x64];
        let err = parse_config_record(&data).expect_err("SPS 数据截断应返回错误");
        assert!(format!("{err}").contains("SPS 数据截断"));
    }

    #[test]
    fn test_parse_record_reject_missing_pps_count() {
        let data = [0x01, 0x64, 0x00, 0x1E, 0xFF, 0xE1, 0x00, 0x01, 0x67];
        let err = parse_config_record(&data).expect_err("缺少 num_pps 字段应返回错误");
        assert!(format!("{err}").contains("numOfPictureParameterSets"));
    }
}
